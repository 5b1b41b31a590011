use alloc::vec::Vec;

use quill_hir::{
    ControlFlowGraph, Function, FxHashSet, InstData, Pass, PostPassStatus, Value,
    reverse_post_order,
};
use quill_hir_analysis::{Loop, LoopInfo, analyses::Dominators};

/// Loop-invariant code motion.
///
/// Hoists computations whose operands are all constants, defined outside
/// the loop, or themselves already identified as invariant, to just before
/// the preheader's terminator. Only speculatively-safe binary operations
/// qualify: a hoisted instruction executes on the zero-trip path, so it
/// must not trap, and φ selections depend on the edge control arrived on.
pub struct LoopInvariantCodeMotion;

impl Pass for LoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn argument(&self) -> &'static str {
        "loop-invariant-code-motion"
    }

    fn run_on_function(&mut self, function: &mut Function) -> PostPassStatus {
        let cfg = ControlFlowGraph::compute(function);
        let doms = Dominators::compute(function, &cfg);
        let loops = LoopInfo::compute(function, &cfg, &doms);

        // Innermost loops first, so invariants bubble outward through
        // enclosing preheaders.
        let mut order: Vec<usize> = (0..loops.len()).collect();
        order.sort_by_key(|index| core::cmp::Reverse(loops.depth(*index)));

        let mut changed = PostPassStatus::Unchanged;
        for index in order {
            changed |= hoist_invariants(function, &cfg, &loops.loops()[index]);
        }
        changed
    }
}

fn hoist_invariants(func: &mut Function, cfg: &ControlFlowGraph, l: &Loop) -> PostPassStatus {
    let Some(preheader) = l.preheader(func, cfg) else {
        log::debug!(
            target: "licm",
            "no preheader for loop at {}; skipping",
            func.block_label(l.header()),
        );
        return PostPassStatus::Unchanged;
    };

    // Visit loop blocks in reverse post-order: an instruction's in-loop
    // operands are seen before the instruction itself, so transitively
    // invariant chains are discovered in dependency order.
    let mut invariants: Vec<quill_hir::Inst> = Vec::new();
    let mut invariant_values: FxHashSet<Value> = FxHashSet::default();
    for block in reverse_post_order(func)
        .into_iter()
        .filter(|block| l.contains_block(*block))
    {
        for inst in func.insts(block).iter().copied() {
            let data = func.dfg.inst(inst);
            let safe = match data {
                InstData::Binary { op, .. } => op.is_speculatively_safe(),
                _ => false,
            };
            if !safe {
                continue;
            }

            let invariant = data.arguments().iter().all(|arg| {
                if func.dfg.is_const(*arg) || invariant_values.contains(arg) {
                    return true;
                }
                match func.dfg.value_def(*arg) {
                    // Defined by an instruction: invariant when that
                    // definition sits outside the loop.
                    Some(def) => func
                        .inst_block(def)
                        .is_none_or(|def_block| !l.contains_block(def_block)),
                    // Function parameters are defined outside any loop.
                    None => true,
                }
            });
            if invariant {
                invariants.push(inst);
                invariant_values.insert(func.dfg.result(inst).expect("binary op has a result"));
            }
        }
    }

    if invariants.is_empty() {
        return PostPassStatus::Unchanged;
    }
    for inst in invariants {
        log::debug!(
            target: "licm",
            "hoisting {} into {}",
            func.display_inst(inst),
            func.block_label(preheader),
        );
        func.move_inst_before_terminator(inst, preheader);
    }
    PostPassStatus::Changed
}
