#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod analyses;
mod bitset;
mod config;
mod dataflow;
mod loops;

pub use self::{
    bitset::BitSet,
    config::DataflowConfig,
    dataflow::{
        BlockInfo, BlockProps, BlockType, DataflowResults, DataflowSolver, Direction,
        TransferFunction,
    },
    loops::{Loop, LoopInfo},
};

#[cfg(test)]
mod tests {
    use alloc::{format, vec::Vec};

    use proptest::prelude::*;
    use quill_hir::{Block, CondCode, ControlFlowGraph, FunctionBuilder, Type, post_order};

    use crate::analyses::Dominators;

    proptest! {
        /// Dominator axioms on randomized "ladder" CFGs: block `i` branches
        /// to `i + 1` and a random other block; the last block returns.
        #[test]
        fn dominator_axioms_on_random_cfgs(
            n in 2usize..10,
            raw_targets in proptest::collection::vec(0usize..32, 10),
        ) {
            let mut fb = FunctionBuilder::new("ladder", &[Type::I32, Type::I32]);
            let x = fb.param(0);
            let y = fb.param(1);
            let blocks: Vec<Block> =
                (0..n).map(|i| fb.create_block(&format!("b{i}"))).collect();
            for i in 0..n {
                fb.switch_to_block(blocks[i]);
                if i + 1 == n {
                    fb.ins_ret(None);
                } else {
                    let cond = fb.ins_icmp(CondCode::Lt, x, y);
                    fb.ins_cond_br(cond, blocks[i + 1], blocks[raw_targets[i] % n]);
                }
            }
            let func = fb.finish();

            let cfg = ControlFlowGraph::compute(&func);
            let doms = Dominators::compute(&func, &cfg);
            let entry = func.entry_block();
            for block in post_order(&func) {
                // Reflexivity, and the entry dominates everything reachable.
                prop_assert!(doms.dominates(block, block));
                prop_assert!(doms.dominates(entry, block));
                if block != entry {
                    // Immediate dominators exist and are strict, i.e. the
                    // idom relation forms a tree rooted at the entry.
                    let idom = doms.immediate_dominator(block);
                    prop_assert!(idom.is_some());
                    prop_assert!(doms.strictly_dominates(idom.unwrap(), block));
                }
            }
        }
    }
}
