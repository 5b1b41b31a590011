use alloc::vec::Vec;

use quill_hir::{Block, ControlFlowGraph, Function, FxHashMap, Inst};

use crate::{
    BitSet, BlockInfo, BlockProps, DataflowResults, DataflowSolver, Direction, TransferFunction,
};

/// Returns true if `inst` must be kept regardless of whether its result is
/// ever used: terminators, debug intrinsics, and instructions with
/// observable side effects.
pub fn is_live_regardless(func: &Function, inst: Inst) -> bool {
    let data = func.dfg.inst(inst);
    data.is_terminator() || data.is_debug() || data.has_side_effects()
}

/// Backward faint-value analysis.
///
/// The domain is every instruction that is not live-regardless. An
/// instruction is faint at a program point when, on every path from that
/// point, its value feeds only other faint computations. GEN holds the
/// instructions defined in a block with no (non-faint-relevant) use below
/// the definition; KILL holds the instructions whose values the block uses.
///
/// Faintness of a use inside the same block cannot be expressed in static
/// GEN/KILL sets, so a single solve under-approximates: deleting the faint
/// instructions it does report exposes their operands as faint on the next
/// solve. Clients iterate analysis and deletion to a fixpoint.
struct FaintTransfer;

impl TransferFunction for FaintTransfer {
    fn debug_name(&self) -> &'static str {
        "faint"
    }

    fn meet(&self, acc: &mut BitSet, input: &BitSet) {
        *acc &= input;
    }

    // IN = (OUT − KILL) ∪ GEN
    fn transfer(&self, _block: Block, props: &mut BlockProps) {
        let mut input = props.kill_set.complemented();
        input &= &props.output;
        input |= &props.gen_set;
        props.input = input;
    }
}

pub struct FaintValues {
    domain: Vec<Inst>,
    indices: FxHashMap<Inst, usize>,
    results: DataflowResults,
}

impl FaintValues {
    pub fn compute(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut domain = Vec::new();
        for block in func.blocks() {
            for inst in func.insts(block) {
                if !is_live_regardless(func, *inst) {
                    domain.push(*inst);
                }
            }
        }
        let indices: FxHashMap<Inst, usize> = domain
            .iter()
            .enumerate()
            .map(|(index, inst)| (*inst, index))
            .collect();
        let n = domain.len();

        let mut info: FxHashMap<Block, BlockInfo> = FxHashMap::default();
        for block in func.blocks() {
            let mut gen_set = BitSet::empty(n);
            let mut kill_set = BitSet::empty(n);

            for inst in func.insts(block).iter().rev().copied() {
                let data = func.dfg.inst(inst);

                // A use through a φ keeps every incoming definition of that
                // φ out of the faint set.
                for arg in data.arguments() {
                    if let Some(def) = func.dfg.value_def(arg)
                        && let Some(incoming) = func.dfg.inst(def).phi_args()
                    {
                        for (_, value) in incoming {
                            if let Some(incoming_def) = func.dfg.value_def(*value)
                                && let Some(index) = indices.get(&incoming_def)
                            {
                                kill_set.set(*index);
                            }
                        }
                    }
                }

                if let Some(index) = indices.get(&inst)
                    && !kill_set.test(*index)
                {
                    gen_set.set(*index);
                }

                for arg in data.arguments() {
                    if let Some(def) = func.dfg.value_def(arg)
                        && let Some(index) = indices.get(&def)
                    {
                        kill_set.set(*index);
                    }
                }
            }
            info.insert(block, BlockInfo { gen_set, kill_set });
        }

        let solver =
            DataflowSolver::new(n, Direction::Backward, BitSet::full(n), BitSet::full(n));
        let results = solver.run(func, cfg, &info, &FaintTransfer);
        Self {
            domain,
            indices,
            results,
        }
    }

    pub fn domain(&self) -> &[Inst] {
        &self.domain
    }

    pub fn index(&self, inst: Inst) -> Option<usize> {
        self.indices.get(&inst).copied()
    }

    /// The faint set at the entry of `block`.
    pub fn faint_in(&self, block: Block) -> &BitSet {
        self.results.input(block)
    }
}

#[cfg(test)]
mod tests {
    use quill_hir::{ControlFlowGraph, FunctionBuilder, Opcode, Type};

    use super::FaintValues;

    /// `x = a + b; y = x + 1; ret 0`: y is faint immediately; x only becomes
    /// faint once y is deleted (its in-block use kills it in the static
    /// sets).
    #[test]
    fn chain_is_faint_from_the_tail() {
        let mut fb = FunctionBuilder::new("chain", &[Type::I32, Type::I32]);
        let a = fb.param(0);
        let b = fb.param(1);
        let entry = fb.create_block("entry");
        fb.switch_to_block(entry);
        let one = fb.iconst(Type::I32, 1);
        let zero = fb.iconst(Type::I32, 0);
        let x = fb.ins_binary(Opcode::Add, Type::I32, a, b);
        let y = fb.ins_binary(Opcode::Add, Type::I32, x, one);
        fb.ins_ret(Some(zero));
        let func = fb.finish();

        let cfg = ControlFlowGraph::compute(&func);
        let faint = FaintValues::compute(&func, &cfg);
        assert_eq!(faint.domain().len(), 2);

        let x_inst = func.dfg.value_def(x).unwrap();
        let y_inst = func.dfg.value_def(y).unwrap();
        let faint_in = faint.faint_in(entry);
        assert!(faint_in.test(faint.index(y_inst).unwrap()));
        assert!(!faint_in.test(faint.index(x_inst).unwrap()));
    }

    /// A value consumed by the return is killed along that path and never
    /// faint.
    #[test]
    fn returned_value_is_not_faint() {
        let mut fb = FunctionBuilder::new("ret_use", &[Type::I32]);
        let a = fb.param(0);
        let entry = fb.create_block("entry");
        fb.switch_to_block(entry);
        let x = fb.ins_binary(Opcode::Add, Type::I32, a, a);
        fb.ins_ret(Some(x));
        let func = fb.finish();

        let cfg = ControlFlowGraph::compute(&func);
        let faint = FaintValues::compute(&func, &cfg);
        let x_inst = func.dfg.value_def(x).unwrap();
        assert!(!faint.faint_in(entry).test(faint.index(x_inst).unwrap()));
    }
}
