use alloc::{collections::VecDeque, format, vec::Vec};

use cranelift_entity::SecondaryMap;
use quill_hir::{
    Block, ControlFlowGraph, Function, FxHashMap, FxHashSet, InstData, Pass, PostPassStatus,
    SmallVec, Value, back_edges,
};
use quill_hir_analysis::analyses::{Expression, LazyCodeMotionAnalysis};

/// Lazy code motion partial redundancy elimination.
///
/// The pass splits every edge into a multi-predecessor block (so each
/// insertion point is a block of its own), runs the four-pass expression
/// analysis, materializes temporaries at the optimal computation points, and
/// rewrites redundant occurrences to the reaching temporary, joining
/// converging temporaries with φ nodes.
pub struct LazyCodeMotion;

impl Pass for LazyCodeMotion {
    fn name(&self) -> &'static str {
        "lcm"
    }

    fn argument(&self) -> &'static str {
        "lazy-code-motion"
    }

    fn run_on_function(&mut self, function: &mut Function) -> PostPassStatus {
        let mut changed = split_incoming_edges(function);

        let cfg = ControlFlowGraph::compute(function);
        let lcm = LazyCodeMotionAnalysis::analyze(function, &cfg);
        if lcm.domain().is_empty() {
            log::trace!(target: "lcm", "{} has no candidate expressions", function.name);
            return changed;
        }

        let inserted = insert_temporaries(function, &lcm);
        changed |= rewrite_occurrences(function, &cfg, &lcm, &inserted);
        changed
    }
}

/// Split each incoming edge of every block with two or more predecessors.
///
/// Splitting is driven by the predecessor's terminator slots, so a
/// conditional branch with both slots targeting the same block produces one
/// split per edge rather than per predecessor.
fn split_incoming_edges(func: &mut Function) -> PostPassStatus {
    let cfg = ControlFlowGraph::compute(func);
    let mut changed = PostPassStatus::Unchanged;
    for block in func.blocks().collect::<Vec<_>>() {
        if cfg.num_preds(block) < 2 {
            continue;
        }
        let mut seen = FxHashSet::default();
        for pred in cfg.preds(block).to_vec() {
            if !seen.insert(pred) {
                continue;
            }
            let term = func
                .terminator(pred)
                .expect("predecessor must end in a branch");
            let dests = func.dfg.inst(term).branch_destinations();
            for (slot, dest) in dests.iter().enumerate() {
                if *dest != block {
                    continue;
                }
                let name = format!(
                    "{}.{}.crit_edge",
                    func.block_label(pred),
                    func.block_label(block)
                );
                let split = func.split_edge(pred, slot, &name);
                log::trace!(
                    target: "lcm",
                    "split edge {} -> {} via {}",
                    func.block_label(pred),
                    func.block_label(block),
                    func.block_label(split),
                );
                changed = PostPassStatus::Changed;
            }
        }
    }
    changed
}

/// Materialize a temporary for every (block, expression) pair in ToInsert,
/// at the block's first insertion point.
fn insert_temporaries(
    func: &mut Function,
    lcm: &LazyCodeMotionAnalysis,
) -> SecondaryMap<Block, FxHashMap<usize, Value>> {
    let mut inserted: SecondaryMap<Block, FxHashMap<usize, Value>> = SecondaryMap::new();
    for block in func.blocks().collect::<Vec<_>>() {
        let indices: Vec<usize> = lcm.to_insert(block).iter_ones().collect();
        if indices.is_empty() {
            continue;
        }
        let mut at = func.first_non_phi_index(block);
        for index in indices {
            let expr = lcm.domain().get(index);
            let ty = lcm.domain().expr_type(func, index);
            let inst = func.insert_inst(
                block,
                at,
                InstData::Binary {
                    op: expr.op,
                    args: [expr.lhs, expr.rhs],
                },
                Some(ty),
            );
            at += 1;
            let value = func.dfg.result(inst).expect("temporary produces a value");
            log::debug!(
                target: "lcm",
                "inserted {expr} as {value} in {}",
                func.block_label(block),
            );
            inserted[block].insert(index, value);
        }
    }
    inserted
}

/// Rewrite redundant occurrences to the reaching temporaries.
///
/// Blocks are visited in topological order over the predecessor graph
/// (Kahn's algorithm seeded with the entry block). Back edges are exempt
/// from the in-degree count — otherwise no natural-loop header would ever
/// be released — and propagation along them is dropped, since the target
/// has already been rewritten by the time the latch is reached.
fn rewrite_occurrences(
    func: &mut Function,
    cfg: &ControlFlowGraph,
    lcm: &LazyCodeMotionAnalysis,
    inserted: &SecondaryMap<Block, FxHashMap<usize, Value>>,
) -> PostPassStatus {
    let backs = back_edges(func);

    let mut in_degree: FxHashMap<Block, usize> = FxHashMap::default();
    for block in func.blocks() {
        let count = cfg
            .preds(block)
            .iter()
            .filter(|pred| !backs.contains(&(**pred, block)))
            .count();
        in_degree.insert(block, count);
    }

    // Reaching temporary definitions per (block, expression index).
    let mut state: SecondaryMap<Block, FxHashMap<usize, Vec<(Value, Block)>>> =
        SecondaryMap::new();
    let mut processed: FxHashSet<Block> = FxHashSet::default();
    let mut queue: VecDeque<Block> = VecDeque::new();
    queue.push_back(func.entry_block());

    let mut changed = PostPassStatus::Unchanged;
    while let Some(block) = queue.pop_front() {
        if !processed.insert(block) {
            continue;
        }

        // Seed with this block's own insertions.
        let mut seeds: Vec<(usize, Value)> =
            inserted[block].iter().map(|(i, v)| (*i, *v)).collect();
        seeds.sort_unstable_by_key(|(index, _)| *index);
        for (index, value) in seeds {
            state[block].entry(index).or_default().push((value, block));
        }

        // One reaching definition propagates as-is; several are joined with
        // a φ at the head of the block.
        let mut indices: Vec<usize> = state[block].keys().copied().collect();
        indices.sort_unstable();
        let mut repl: FxHashMap<usize, Value> = FxHashMap::default();
        for index in indices {
            let defs = state[block][&index].clone();
            let value = if defs.len() == 1 {
                defs[0].0
            } else {
                let ty = func.dfg.value_type(defs[0].0);
                let args: SmallVec<[(Block, Value); 2]> =
                    defs.iter().map(|(value, origin)| (*origin, *value)).collect();
                let at = func.first_non_phi_index(block);
                let phi = func.insert_inst(block, at, InstData::Phi { args }, Some(ty));
                changed = PostPassStatus::Changed;
                let phi_value = func.dfg.result(phi).expect("φ produces a value");
                log::debug!(
                    target: "lcm",
                    "joined {} reaching temporaries for {} as {phi_value} in {}",
                    defs.len(),
                    lcm.domain().get(index),
                    func.block_label(block),
                );
                phi_value
            };
            repl.insert(index, value);
        }

        // Replace the redundant occurrences of this block.
        for inst in func.insts(block).to_vec() {
            let Some(expr) = Expression::from_inst(func, inst) else {
                continue;
            };
            let Some(index) = lcm.domain().index_of(&expr) else {
                continue;
            };
            if !lcm.to_replace(block).test(index) {
                continue;
            }
            let Some(replacement) = repl.get(&index).copied() else {
                continue;
            };
            let result = func.dfg.result(inst).expect("binary op has a result");
            if replacement == result {
                continue;
            }
            log::debug!(
                target: "lcm",
                "replacing {} with {replacement} in {}",
                func.display_inst(inst),
                func.block_label(block),
            );
            func.replace_all_uses_with(result, replacement);
            func.erase_inst(inst);
            changed = PostPassStatus::Changed;
        }

        // Propagate reaching definitions and release successors.
        for succ in cfg.succs(block).to_vec() {
            if !processed.contains(&succ) {
                let mut reaching: Vec<(usize, Value)> =
                    repl.iter().map(|(i, v)| (*i, *v)).collect();
                reaching.sort_unstable_by_key(|(index, _)| *index);
                for (index, value) in reaching {
                    state[succ].entry(index).or_default().push((value, block));
                }
            }
            if !backs.contains(&(block, succ)) {
                let degree = in_degree.get_mut(&succ).expect("successor has an in-degree");
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use alloc::vec::Vec;

    use quill_hir::{
        Block, CondCode, Function, FunctionBuilder, Inst, Opcode, Pass, PostPassStatus, Type,
        verify,
    };

    use super::LazyCodeMotion;

    fn binaries(func: &Function) -> Vec<Inst> {
        func.blocks()
            .flat_map(|block| func.insts(block).to_vec())
            .filter(|inst| func.dfg.inst(*inst).is_binary())
            .collect()
    }

    fn phis(func: &Function) -> Vec<Inst> {
        func.blocks()
            .flat_map(|block| func.insts(block).to_vec())
            .filter(|inst| func.dfg.inst(*inst).is_phi())
            .collect()
    }

    /// The diamond where `x + y` is computed on one arm and again at the
    /// merge: the merge occurrence is replaced by a φ of the two reaching
    /// temporaries, with the new computation sitting on the split edge of
    /// the arm that did not compute it.
    fn diamond() -> (Function, [Block; 4]) {
        let mut fb = FunctionBuilder::new("diamond", &[Type::I32, Type::I32]);
        let x = fb.param(0);
        let y = fb.param(1);
        let a = fb.create_block("a");
        let b = fb.create_block("b");
        let c = fb.create_block("c");
        let m = fb.create_block("m");
        fb.switch_to_block(a);
        let cond = fb.ins_icmp(CondCode::Lt, x, y);
        fb.ins_cond_br(cond, b, c);
        fb.switch_to_block(b);
        let t0 = fb.ins_binary(Opcode::Add, Type::I32, x, y);
        let _ = t0;
        fb.ins_br(m);
        fb.switch_to_block(c);
        fb.ins_br(m);
        fb.switch_to_block(m);
        let t1 = fb.ins_binary(Opcode::Add, Type::I32, x, y);
        fb.ins_ret(Some(t1));
        (fb.finish(), [a, b, c, m])
    }

    #[test]
    fn diamond_partial_redundancy_is_eliminated() {
        let (mut func, [_a, b, c, m]) = diamond();
        let status = LazyCodeMotion.run_on_function(&mut func);
        assert!(status.ir_changed());
        verify(&func).unwrap();

        // The merge no longer computes x + y; it starts with the join φ and
        // returns its value.
        let m_insts = func.insts(m);
        assert_eq!(m_insts.len(), 2);
        let phi = func.dfg.inst(m_insts[0]).phi_args().expect("expected a join φ");
        assert_eq!(phi.len(), 2);
        assert!(func.dfg.inst(m_insts[1]).is_return());

        // One temporary per arm: b computes it directly, the c-side edge
        // block materializes the other.
        let all = binaries(&func);
        assert_eq!(all.len(), 2);
        let b_split = func.successors(b)[0];
        let c_split = func.successors(c)[0];
        assert!(func.insts(b).iter().any(|i| func.dfg.inst(*i).is_binary()));
        assert!(func.insts(c_split).iter().any(|i| func.dfg.inst(*i).is_binary()));
        // The φ's incoming temporaries arrive through the two split blocks.
        let mut incoming: Vec<Block> = phi.iter().map(|(block, _)| *block).collect();
        incoming.sort_unstable();
        let mut expected = alloc::vec![b_split, c_split];
        expected.sort_unstable();
        assert_eq!(incoming, expected);
    }

    /// Rerunning the pass moves nothing further: no new temporaries, no new
    /// φs (preprocessing may add pass-through blocks, but computations are
    /// stable).
    #[test]
    fn code_motion_is_idempotent() {
        let (mut func, _) = diamond();
        LazyCodeMotion.run_on_function(&mut func);
        let binaries_before = binaries(&func).len();
        let phis_before = phis(&func).len();

        LazyCodeMotion.run_on_function(&mut func);
        verify(&func).unwrap();
        assert_eq!(binaries(&func).len(), binaries_before);
        assert_eq!(phis(&func).len(), phis_before);
    }

    /// A rotated (do-while style) loop: the invariant `x * 4` inside the
    /// body is computed once in the block guarding the loop entry, and the
    /// body's occurrence is rewritten to the temporary.
    #[test]
    fn hoists_invariant_out_of_rotated_loop() {
        let mut fb = FunctionBuilder::new("dowhile", &[Type::I32, Type::I32]);
        let x = fb.param(0);
        let n = fb.param(1);
        let pre = fb.create_block("pre");
        let body = fb.create_block("body");
        let exit = fb.create_block("exit");
        fb.switch_to_block(pre);
        let four = fb.iconst(Type::I32, 4);
        let enter = fb.ins_icmp(CondCode::Lt, four, n);
        fb.ins_cond_br(enter, body, exit);
        fb.switch_to_block(body);
        let t = fb.ins_binary(Opcode::Mul, Type::I32, x, four);
        let again = fb.ins_icmp(CondCode::Lt, t, n);
        fb.ins_cond_br(again, body, exit);
        fb.switch_to_block(exit);
        fb.ins_ret(None);
        let mut func = fb.finish();

        let status = LazyCodeMotion.run_on_function(&mut func);
        assert!(status.ir_changed());
        verify(&func).unwrap();

        // Exactly one multiplication remains, in the entry-side split block
        // in front of the loop, not in the body.
        let all = binaries(&func);
        assert_eq!(all.len(), 1);
        let home = func.inst_block(all[0]).unwrap();
        assert_eq!(home, func.successors(pre)[0]);
        assert!(!func.insts(body).iter().any(|i| func.dfg.inst(*i).is_binary()));
    }

    /// No candidate expressions and no critical edges: nothing changes.
    #[test]
    fn no_expressions_is_a_no_op() {
        let mut fb = FunctionBuilder::new("nothing", &[Type::I32]);
        let x = fb.param(0);
        let entry = fb.create_block("entry");
        fb.switch_to_block(entry);
        fb.ins_ret(Some(x));
        let mut func = fb.finish();

        let status = LazyCodeMotion.run_on_function(&mut func);
        assert_eq!(status, PostPassStatus::Unchanged);
        assert_eq!(func.num_blocks(), 1);
    }
}
