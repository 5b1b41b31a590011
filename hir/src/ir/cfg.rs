use alloc::vec::Vec;

use cranelift_entity::SecondaryMap;
use smallvec::SmallVec;

use super::{Block, Function};
use crate::FxHashSet;

/// Predecessor/successor maps for a function's CFG.
///
/// The graph is a snapshot: passes that perform CFG surgery recompute it
/// afterwards rather than maintaining it incrementally. Predecessors and
/// successors are recorded once per edge, so a conditional branch with both
/// slots targeting the same block contributes two entries.
pub struct ControlFlowGraph {
    preds: SecondaryMap<Block, SmallVec<[Block; 4]>>,
    succs: SecondaryMap<Block, SmallVec<[Block; 2]>>,
}

impl ControlFlowGraph {
    pub fn compute(func: &Function) -> Self {
        let mut preds: SecondaryMap<Block, SmallVec<[Block; 4]>> = SecondaryMap::new();
        let mut succs: SecondaryMap<Block, SmallVec<[Block; 2]>> = SecondaryMap::new();
        for block in func.blocks() {
            let dests = func.successors(block);
            for dest in dests.iter().copied() {
                preds[dest].push(block);
            }
            succs[block] = dests;
        }
        Self { preds, succs }
    }

    pub fn preds(&self, block: Block) -> &[Block] {
        &self.preds[block]
    }

    pub fn succs(&self, block: Block) -> &[Block] {
        &self.succs[block]
    }

    pub fn num_preds(&self, block: Block) -> usize {
        self.preds[block].len()
    }
}

/// Blocks reachable from the entry block, in post-order of a depth-first
/// traversal over successors.
pub fn post_order(func: &Function) -> Vec<Block> {
    let mut order = Vec::with_capacity(func.num_blocks());
    let mut visited = FxHashSet::default();
    // (block, next successor slot to visit)
    let mut stack: Vec<(Block, usize)> = Vec::new();

    let entry = func.entry_block();
    visited.insert(entry);
    stack.push((entry, 0));
    while let Some((block, slot)) = stack.pop() {
        let succs = func.successors(block);
        match succs.get(slot) {
            Some(succ) => {
                stack.push((block, slot + 1));
                if visited.insert(*succ) {
                    stack.push((*succ, 0));
                }
            }
            None => order.push(block),
        }
    }
    order
}

/// Blocks reachable from the entry block, in reverse post-order.
pub fn reverse_post_order(func: &Function) -> Vec<Block> {
    let mut order = post_order(func);
    order.reverse();
    order
}

/// The set of DFS back edges `(from, to)` in the CFG.
///
/// An edge is a back edge when it targets a block still open on the DFS
/// stack; for reducible CFGs these are exactly the loop back edges.
pub fn back_edges(func: &Function) -> FxHashSet<(Block, Block)> {
    let mut edges = FxHashSet::default();
    let mut visited = FxHashSet::default();
    let mut on_stack = FxHashSet::default();
    let mut stack: Vec<(Block, usize)> = Vec::new();

    let entry = func.entry_block();
    visited.insert(entry);
    on_stack.insert(entry);
    stack.push((entry, 0));
    while let Some((block, slot)) = stack.pop() {
        let succs = func.successors(block);
        match succs.get(slot) {
            Some(succ) => {
                stack.push((block, slot + 1));
                if on_stack.contains(succ) {
                    edges.insert((block, *succ));
                } else if visited.insert(*succ) {
                    on_stack.insert(*succ);
                    stack.push((*succ, 0));
                }
            }
            None => {
                on_stack.remove(&block);
            }
        }
    }
    edges
}
