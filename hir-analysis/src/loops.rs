use alloc::vec::Vec;

use cranelift_entity::EntitySet;
use quill_hir::{Block, ControlFlowGraph, Function, FxHashSet, reverse_post_order};

use crate::analyses::Dominators;

/// A natural loop: a header plus every block that can reach one of the
/// header's back edges without leaving through the header.
pub struct Loop {
    header: Block,
    /// Loop blocks; the header is always at index 0.
    blocks: Vec<Block>,
    block_set: EntitySet<Block>,
    parent: Option<usize>,
}

impl Loop {
    pub fn header(&self) -> Block {
        self.header
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn contains_block(&self, block: Block) -> bool {
        self.block_set.contains(block)
    }

    /// The unique predecessor of the header outside the loop, if there is
    /// exactly one.
    pub fn loop_predecessor(&self, cfg: &ControlFlowGraph) -> Option<Block> {
        let mut out = None;
        for pred in cfg.preds(self.header) {
            if !self.contains_block(*pred) {
                if out.is_some_and(|o| o != *pred) {
                    return None;
                }
                out = Some(*pred);
            }
        }
        out
    }

    /// The preheader: the loop predecessor, provided it branches only into
    /// the loop.
    pub fn preheader(&self, func: &Function, cfg: &ControlFlowGraph) -> Option<Block> {
        let out = self.loop_predecessor(cfg)?;
        if func.successors(out).len() != 1 {
            return None;
        }
        Some(out)
    }

    /// The unique in-loop predecessor of the header (the source of the back
    /// edge), if there is exactly one.
    pub fn latch(&self, cfg: &ControlFlowGraph) -> Option<Block> {
        let mut latch = None;
        for pred in cfg.preds(self.header) {
            if self.contains_block(*pred) {
                if latch.is_some_and(|l| l != *pred) {
                    return None;
                }
                latch = Some(*pred);
            }
        }
        latch
    }

    /// The unique block outside the loop that the loop branches to, if there
    /// is exactly one.
    pub fn exit_block(&self, func: &Function) -> Option<Block> {
        let mut exit = None;
        for block in self.blocks.iter().copied() {
            for succ in func.successors(block) {
                if !self.contains_block(succ) {
                    if exit.is_some_and(|e| e != succ) {
                        return None;
                    }
                    exit = Some(succ);
                }
            }
        }
        exit
    }
}

/// All natural loops of a function, discovered from the dominance relation.
pub struct LoopInfo {
    loops: Vec<Loop>,
}

impl LoopInfo {
    /// Discover loops: every CFG edge `latch → header` where the header
    /// dominates the latch starts a loop, whose body is collected by walking
    /// predecessors backwards from the latches until the header.
    pub fn compute(func: &Function, cfg: &ControlFlowGraph, doms: &Dominators) -> Self {
        let rpo = reverse_post_order(func);
        let reachable: FxHashSet<Block> = rpo.iter().copied().collect();

        let mut loops = Vec::new();
        for header in rpo.iter().copied() {
            let latches: Vec<Block> = cfg
                .preds(header)
                .iter()
                .copied()
                .filter(|pred| reachable.contains(pred) && doms.dominates(header, *pred))
                .collect();
            if latches.is_empty() {
                continue;
            }

            let mut block_set = EntitySet::new();
            block_set.insert(header);
            let mut blocks = alloc::vec![header];
            let mut worklist = latches;
            while let Some(block) = worklist.pop() {
                if block_set.insert(block) {
                    blocks.push(block);
                    worklist.extend(
                        cfg.preds(block)
                            .iter()
                            .copied()
                            .filter(|pred| reachable.contains(pred)),
                    );
                }
            }
            loops.push(Loop {
                header,
                blocks,
                block_set,
                parent: None,
            });
        }

        // The parent of a loop is the smallest other loop that contains its
        // header.
        for i in 0..loops.len() {
            let mut parent: Option<usize> = None;
            for j in 0..loops.len() {
                if i == j || !loops[j].contains_block(loops[i].header) {
                    continue;
                }
                if parent.is_none_or(|p| loops[j].num_blocks() < loops[p].num_blocks()) {
                    parent = Some(j);
                }
            }
            loops[i].parent = parent;
        }

        Self { loops }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn parent_of(&self, index: usize) -> Option<usize> {
        self.loops[index].parent
    }

    /// Nesting depth of a loop; outermost loops have depth 1.
    pub fn depth(&self, index: usize) -> usize {
        let mut depth = 1;
        let mut current = self.loops[index].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.loops[parent].parent;
        }
        depth
    }

    /// Add `block` to the loop at `index` and every enclosing loop.
    ///
    /// For use by transforms that create blocks (landing pads, unified
    /// exits) belonging to an enclosing loop.
    pub fn add_block_to_loop(&mut self, index: usize, block: Block) {
        let mut current = Some(index);
        while let Some(i) = current {
            let l = &mut self.loops[i];
            if l.block_set.insert(block) {
                l.blocks.push(block);
            }
            current = l.parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use quill_hir::{CondCode, ControlFlowGraph, FunctionBuilder, Opcode, Type};

    use super::LoopInfo;
    use crate::analyses::Dominators;

    /// preheader → header ⇄ body(latch), header → exit.
    #[test]
    fn while_loop_shape() {
        let mut fb = FunctionBuilder::new("while", &[Type::I32]);
        let n = fb.param(0);
        let pre = fb.create_block("preheader");
        let header = fb.create_block("header");
        let body = fb.create_block("body");
        let exit = fb.create_block("exit");
        fb.switch_to_block(pre);
        fb.ins_br(header);
        fb.switch_to_block(header);
        let zero = fb.iconst(Type::I32, 0);
        let i = fb.ins_phi(Type::I32, &[(pre, zero), (body, n)]);
        let cond = fb.ins_icmp(CondCode::Lt, i, n);
        fb.ins_cond_br(cond, body, exit);
        fb.switch_to_block(body);
        let next = fb.ins_binary(Opcode::Add, Type::I32, i, n);
        let _ = next;
        fb.ins_br(header);
        fb.switch_to_block(exit);
        fb.ins_ret(Some(i));
        let func = fb.finish();

        let cfg = ControlFlowGraph::compute(&func);
        let doms = Dominators::compute(&func, &cfg);
        let loops = LoopInfo::compute(&func, &cfg, &doms);

        assert_eq!(loops.len(), 1);
        let l = &loops.loops()[0];
        assert_eq!(l.header(), header);
        assert!(l.contains_block(body));
        assert!(!l.contains_block(pre));
        assert!(!l.contains_block(exit));
        assert_eq!(l.preheader(&func, &cfg), Some(pre));
        assert_eq!(l.latch(&cfg), Some(body));
        assert_eq!(l.exit_block(&func), Some(exit));
        assert_eq!(loops.depth(0), 1);

        let rendered = alloc::format!("{}", doms.display_loops(&func, &loops));
        assert!(rendered.contains("loop 0:"));
        assert!(rendered.contains("body: idom = header"));
    }

    /// A nest: the inner loop's parent is the outer loop, and the outer loop
    /// contains the inner blocks.
    #[test]
    fn nested_loops() {
        let mut fb = FunctionBuilder::new("nest", &[Type::I32]);
        let n = fb.param(0);
        let entry = fb.create_block("entry");
        let outer = fb.create_block("outer");
        let inner = fb.create_block("inner");
        let inner_body = fb.create_block("inner_body");
        let outer_latch = fb.create_block("outer_latch");
        let exit = fb.create_block("exit");

        fb.switch_to_block(entry);
        fb.ins_br(outer);
        fb.switch_to_block(outer);
        let c0 = fb.ins_icmp(CondCode::Lt, n, n);
        fb.ins_cond_br(c0, inner, exit);
        fb.switch_to_block(inner);
        let c1 = fb.ins_icmp(CondCode::Gt, n, n);
        fb.ins_cond_br(c1, inner_body, outer_latch);
        fb.switch_to_block(inner_body);
        fb.ins_br(inner);
        fb.switch_to_block(outer_latch);
        fb.ins_br(outer);
        fb.switch_to_block(exit);
        fb.ins_ret(None);
        let func = fb.finish();

        let cfg = ControlFlowGraph::compute(&func);
        let doms = Dominators::compute(&func, &cfg);
        let loops = LoopInfo::compute(&func, &cfg, &doms);

        assert_eq!(loops.len(), 2);
        let outer_index = (0..2).find(|i| loops.loops()[*i].header() == outer).unwrap();
        let inner_index = 1 - outer_index;
        assert_eq!(loops.loops()[inner_index].header(), inner);
        assert_eq!(loops.parent_of(inner_index), Some(outer_index));
        assert_eq!(loops.parent_of(outer_index), None);
        assert_eq!(loops.depth(inner_index), 2);
        assert!(loops.loops()[outer_index].contains_block(inner_body));
    }
}
