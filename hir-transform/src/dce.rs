use alloc::vec::Vec;

use quill_hir::{ControlFlowGraph, Function, Pass, PostPassStatus};
use quill_hir_analysis::analyses::{FaintValues, is_live_regardless};

/// Faint-value dead code elimination.
///
/// Runs the backward faint analysis and erases every faint instruction whose
/// result has no remaining uses, replacing any residual uses with `undef`.
/// Erasing an instruction can expose its operands as faint (their only use
/// was the erased instruction), so analysis and deletion repeat until a
/// round deletes nothing.
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn argument(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run_on_function(&mut self, function: &mut Function) -> PostPassStatus {
        let mut changed = PostPassStatus::Unchanged;
        loop {
            let deleted = delete_faint_instructions(function);
            if deleted == 0 {
                break;
            }
            log::debug!(target: "dce", "deleted {deleted} instructions in {}", function.name);
            changed = PostPassStatus::Changed;
        }
        changed
    }
}

fn delete_faint_instructions(func: &mut Function) -> usize {
    let cfg = ControlFlowGraph::compute(func);
    let faint = FaintValues::compute(func, &cfg);

    let mut deleted = 0;
    for block in func.blocks().collect::<Vec<_>>() {
        // Queue candidates bottom-up so uses are deleted before definitions.
        let mut to_delete = Vec::new();
        for inst in func.insts(block).iter().rev().copied() {
            if is_live_regardless(func, inst) {
                continue;
            }
            if let Some(index) = faint.index(inst)
                && faint.faint_in(block).test(index)
            {
                to_delete.push(inst);
            }
        }

        for inst in to_delete {
            let result = func
                .dfg
                .result(inst)
                .expect("faint candidates always produce a value");
            // A queued instruction can still be referenced (e.g. from a
            // later block); leave it for a later round.
            if func.has_uses(result) {
                continue;
            }
            log::debug!(target: "dce", "deleting {}", func.display_inst(inst));
            let undef = func.dfg.undef(func.dfg.value_type(result));
            func.replace_all_uses_with(result, undef);
            func.erase_inst(inst);
            deleted += 1;
        }
    }
    deleted
}
