use alloc::vec::Vec;
use core::fmt;

use quill_hir::{Block, ControlFlowGraph, Function, FxHashMap};

use crate::{
    BitSet, BlockInfo, BlockProps, DataflowResults, DataflowSolver, Direction, TransferFunction,
};

/// Forward dominator analysis over the block domain.
///
/// Every block generates itself and kills nothing; the meet is intersection
/// over predecessors, with the entry block's IN pinned empty. At the
/// fixpoint, OUT(B) is exactly the set of blocks dominating B.
struct DominatorTransfer;

impl TransferFunction for DominatorTransfer {
    fn debug_name(&self) -> &'static str {
        "dominators"
    }

    fn meet(&self, acc: &mut BitSet, input: &BitSet) {
        *acc &= input;
    }

    fn transfer(&self, _block: Block, props: &mut BlockProps) {
        let mut out = props.input.clone();
        out |= &props.gen_set;
        props.output = out;
    }
}

/// Dominator sets and immediate dominators for a function.
pub struct Dominators {
    domain: Vec<Block>,
    indices: FxHashMap<Block, usize>,
    results: DataflowResults,
}

impl Dominators {
    pub fn compute(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let domain: Vec<Block> = func.blocks().collect();
        let indices: FxHashMap<Block, usize> = domain
            .iter()
            .enumerate()
            .map(|(index, block)| (*block, index))
            .collect();
        let n = domain.len();

        let mut info: FxHashMap<Block, BlockInfo> = FxHashMap::default();
        for block in domain.iter().copied() {
            let mut gen_set = BitSet::empty(n);
            gen_set.set(indices[&block]);
            info.insert(
                block,
                BlockInfo {
                    gen_set,
                    kill_set: BitSet::empty(n),
                },
            );
        }

        let solver =
            DataflowSolver::new(n, Direction::Forward, BitSet::empty(n), BitSet::full(n));
        let results = solver.run(func, cfg, &info, &DominatorTransfer);
        Self {
            domain,
            indices,
            results,
        }
    }

    /// The dominator set of `block` as a bit vector over the block domain.
    pub fn dominator_set(&self, block: Block) -> &BitSet {
        self.results.output(block)
    }

    /// Blocks dominating `block`, including `block` itself.
    pub fn dominators(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.results
            .output(block)
            .iter_ones()
            .map(|index| self.domain[index])
    }

    /// Returns true if `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        self.results.output(b).test(self.indices[&a])
    }

    pub fn strictly_dominates(&self, a: Block, b: Block) -> bool {
        a != b && self.dominates(a, b)
    }

    /// The immediate dominator of `block`: the unique strict dominator D
    /// such that every other strict dominator of `block` dominates D.
    ///
    /// `None` for the entry block and for blocks without strict dominators.
    pub fn immediate_dominator(&self, block: Block) -> Option<Block> {
        let mut strict = self.dominator_set(block).clone();
        strict.reset(self.indices[&block]);
        self.dominators(block)
            .filter(|dom| *dom != block)
            .find(|dom| strict.is_subset(self.dominator_set(*dom)))
    }

    /// Render per-block dominator sets and immediate dominators.
    pub fn display<'a>(&'a self, func: &'a Function) -> impl fmt::Display + 'a {
        DisplayDominators { doms: self, func }
    }

    /// Render the immediate dominator of every block of every loop, in the
    /// style of the dominator diagnostics.
    pub fn display_loops<'a>(
        &'a self,
        func: &'a Function,
        loops: &'a crate::LoopInfo,
    ) -> impl fmt::Display + 'a {
        DisplayLoopDominators {
            doms: self,
            func,
            loops,
        }
    }
}

struct DisplayLoopDominators<'a> {
    doms: &'a Dominators,
    func: &'a Function,
    loops: &'a crate::LoopInfo,
}

impl fmt::Display for DisplayLoopDominators<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, l) in self.loops.loops().iter().enumerate() {
            writeln!(f, "loop {index}:")?;
            for block in l.blocks() {
                write!(f, "  {}: idom = ", self.func.block_label(*block))?;
                match self.doms.immediate_dominator(*block) {
                    Some(idom) => writeln!(f, "{}", self.func.block_label(idom))?,
                    None => writeln!(f, "\"\"")?,
                }
            }
        }
        Ok(())
    }
}

struct DisplayDominators<'a> {
    doms: &'a Dominators,
    func: &'a Function,
}

impl fmt::Display for DisplayDominators<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.func.blocks() {
            write!(f, "{}: dom = {{", self.func.block_label(block))?;
            for (i, dom) in self.doms.dominators(block).enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", self.func.block_label(dom))?;
            }
            f.write_str("}, idom = ")?;
            match self.doms.immediate_dominator(block) {
                Some(idom) => writeln!(f, "{}", self.func.block_label(idom))?,
                None => writeln!(f, "\"\"")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use pretty_assertions::assert_eq;
    use quill_hir::{CondCode, ControlFlowGraph, FunctionBuilder, Type};

    use super::Dominators;

    /// A (entry) → B, A → C, B → D, C → D.
    #[test]
    fn diamond() {
        let mut fb = FunctionBuilder::new("diamond", &[Type::I32, Type::I32]);
        let x = fb.param(0);
        let y = fb.param(1);
        let a = fb.create_block("a");
        let b = fb.create_block("b");
        let c = fb.create_block("c");
        let d = fb.create_block("d");
        fb.switch_to_block(a);
        let cond = fb.ins_icmp(CondCode::Lt, x, y);
        fb.ins_cond_br(cond, b, c);
        fb.switch_to_block(b);
        fb.ins_br(d);
        fb.switch_to_block(c);
        fb.ins_br(d);
        fb.switch_to_block(d);
        fb.ins_ret(None);
        let func = fb.finish();

        let cfg = ControlFlowGraph::compute(&func);
        let doms = Dominators::compute(&func, &cfg);

        let set = |block| {
            let mut blocks: Vec<_> = doms.dominators(block).collect();
            blocks.sort();
            blocks
        };
        assert_eq!(set(a), alloc::vec![a]);
        assert_eq!(set(b), alloc::vec![a, b]);
        assert_eq!(set(c), alloc::vec![a, c]);
        assert_eq!(set(d), alloc::vec![a, d]);

        assert_eq!(doms.immediate_dominator(a), None);
        assert_eq!(doms.immediate_dominator(b), Some(a));
        assert_eq!(doms.immediate_dominator(c), Some(a));
        assert_eq!(doms.immediate_dominator(d), Some(a));

        let rendered = alloc::format!("{}", doms.display(&func));
        assert!(rendered.contains("b: dom = {a, b}, idom = a"));
        assert!(rendered.contains("a: dom = {a}, idom = \"\""));
    }

    /// Loops do not disturb dominance: preheader → header ⇄ body, header →
    /// exit.
    #[test]
    fn simple_loop() {
        let mut fb = FunctionBuilder::new("loop", &[Type::I32]);
        let n = fb.param(0);
        let pre = fb.create_block("preheader");
        let header = fb.create_block("header");
        let body = fb.create_block("body");
        let exit = fb.create_block("exit");
        fb.switch_to_block(pre);
        fb.ins_br(header);
        fb.switch_to_block(header);
        let zero = fb.iconst(Type::I32, 0);
        let cond = fb.ins_icmp(CondCode::Lt, zero, n);
        fb.ins_cond_br(cond, body, exit);
        fb.switch_to_block(body);
        fb.ins_br(header);
        fb.switch_to_block(exit);
        fb.ins_ret(None);
        let func = fb.finish();

        let cfg = ControlFlowGraph::compute(&func);
        let doms = Dominators::compute(&func, &cfg);

        assert!(doms.dominates(pre, exit));
        assert!(doms.dominates(header, body));
        assert!(!doms.dominates(body, header));
        assert_eq!(doms.immediate_dominator(body), Some(header));
        assert_eq!(doms.immediate_dominator(exit), Some(header));
        for block in func.blocks() {
            assert!(doms.dominates(block, block));
            assert!(doms.dominates(pre, block));
        }
    }
}
