use cranelift_entity::SecondaryMap;
use quill_hir::{Block, ControlFlowGraph, Function, FxHashMap, SmallVec, post_order};

use crate::{BitSet, DataflowConfig};

/// The direction facts propagate in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// The role of a block with respect to boundary conditions.
///
/// A block containing a return is an exit block even when it is also the
/// function entry; the exit labeling is applied last and wins.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockType {
    Entry,
    Exit,
    #[default]
    Regular,
}

/// Per-block facts a client analysis provides before solving.
#[derive(Clone, Default)]
pub struct BlockInfo {
    pub gen_set: BitSet,
    pub kill_set: BitSet,
}

/// Per-block solver state.
///
/// All four bit vectors share the domain width. The predecessor and
/// successor lists are snapshots taken at solver construction; the CFG must
/// not change while the solver runs.
#[derive(Clone, Default)]
pub struct BlockProps {
    pub kind: BlockType,
    pub input: BitSet,
    pub output: BitSet,
    pub gen_set: BitSet,
    pub kill_set: BitSet,
    pub predecessors: SmallVec<[Block; 4]>,
    pub successors: SmallVec<[Block; 2]>,
}

/// The meet/transfer capability pair a client analysis supplies to the
/// solver.
///
/// Implementations are plain structs closing over whatever auxiliary tables
/// the transfer function needs (e.g. the postponable analysis holds the
/// earliest sets, the used analysis holds the latest sets).
pub trait TransferFunction {
    /// A short name for the analysis, used as a logging target.
    fn debug_name(&self) -> &'static str;

    /// Fold one more incoming fact into the meet accumulator.
    fn meet(&self, acc: &mut BitSet, input: &BitSet);

    /// Apply the block transfer function: derive OUT from IN in a forward
    /// analysis, IN from OUT in a backward one.
    fn transfer(&self, block: Block, props: &mut BlockProps);
}

/// Results of a solver run, readable per block after the fixpoint.
pub struct DataflowResults {
    props: SecondaryMap<Block, BlockProps>,
}

impl DataflowResults {
    pub fn props(&self, block: Block) -> &BlockProps {
        &self.props[block]
    }

    pub fn input(&self, block: Block) -> &BitSet {
        &self.props[block].input
    }

    pub fn output(&self, block: Block) -> &BitSet {
        &self.props[block].output
    }
}

/// The iterative bit-vector dataflow engine.
///
/// The solver is generic over the meet operator and transfer function; the
/// boundary condition applies to the IN of the entry block (forward) or the
/// OUT of exit blocks (backward), and the initial condition to the derived
/// vector of every block.
pub struct DataflowSolver {
    domain_size: usize,
    direction: Direction,
    boundary: BitSet,
    init: BitSet,
    config: DataflowConfig,
}

impl DataflowSolver {
    pub fn new(domain_size: usize, direction: Direction, boundary: BitSet, init: BitSet) -> Self {
        debug_assert_eq!(boundary.len(), domain_size);
        debug_assert_eq!(init.len(), domain_size);
        Self {
            domain_size,
            direction,
            boundary,
            init,
            config: DataflowConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DataflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Run `transfer` to fixpoint over `func` and return the per-block
    /// IN/OUT assignment.
    ///
    /// Forward analyses visit blocks in post-order of the entry DFS tree,
    /// backward analyses in reverse post-order. The visiting order only
    /// affects how many rounds convergence takes, never the fixpoint itself.
    pub fn run<T: TransferFunction>(
        &self,
        func: &Function,
        cfg: &ControlFlowGraph,
        info: &FxHashMap<Block, BlockInfo>,
        transfer: &T,
    ) -> DataflowResults {
        let mut props = self.initialize(func, cfg, info);

        let mut traversal = post_order(func);
        if self.direction == Direction::Backward {
            traversal.reverse();
        }

        let max_rounds = self.config.max_rounds(self.domain_size, func.num_blocks());
        let mut prev_output: SecondaryMap<Block, BitSet> = SecondaryMap::new();
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            if rounds > max_rounds {
                log::error!(
                    target: "dataflow",
                    "{} failed to converge within {max_rounds} rounds; returning current state",
                    transfer.debug_name(),
                );
                break;
            }

            for block in traversal.iter().copied() {
                prev_output[block] = props[block].output.clone();

                // Collect the facts flowing into this block. A block with no
                // incoming edges in the traversal direction skips the meet
                // and keeps its initialized vector.
                let edges: SmallVec<[Block; 4]> = match self.direction {
                    Direction::Forward => props[block].predecessors.clone(),
                    Direction::Backward => {
                        SmallVec::from_slice(props[block].successors.as_slice())
                    }
                };
                let mut meet: Option<BitSet> = None;
                for edge in edges {
                    let fact = match self.direction {
                        Direction::Forward => &props[edge].output,
                        Direction::Backward => &props[edge].input,
                    };
                    match meet.as_mut() {
                        None => meet = Some(fact.clone()),
                        Some(acc) => transfer.meet(acc, fact),
                    }
                }
                if let Some(meet) = meet {
                    match self.direction {
                        Direction::Forward => props[block].input = meet,
                        Direction::Backward => props[block].output = meet,
                    }
                }

                transfer.transfer(block, &mut props[block]);
            }

            let converged = traversal
                .iter()
                .all(|block| props[*block].output == prev_output[*block]);
            if converged {
                log::debug!(
                    target: "dataflow",
                    "{} converged after {rounds} rounds",
                    transfer.debug_name(),
                );
                break;
            }
        }

        DataflowResults { props }
    }

    fn initialize(
        &self,
        func: &Function,
        cfg: &ControlFlowGraph,
        info: &FxHashMap<Block, BlockInfo>,
    ) -> SecondaryMap<Block, BlockProps> {
        let empty = BitSet::empty(self.domain_size);
        let mut props: SecondaryMap<Block, BlockProps> = SecondaryMap::new();
        for block in func.blocks() {
            let mut p = BlockProps {
                kind: BlockType::Regular,
                input: empty.clone(),
                output: empty.clone(),
                gen_set: empty.clone(),
                kill_set: empty.clone(),
                predecessors: SmallVec::from_slice(cfg.preds(block)),
                successors: SmallVec::from_slice(cfg.succs(block)),
            };
            if let Some(info) = info.get(&block) {
                debug_assert_eq!(info.gen_set.len(), self.domain_size);
                debug_assert_eq!(info.kill_set.len(), self.domain_size);
                p.gen_set = info.gen_set.clone();
                p.kill_set = info.kill_set.clone();
            }
            if block == func.entry_block() {
                p.kind = BlockType::Entry;
            }
            // A block holding a return is an exit block, even if it is also
            // the entry.
            if func
                .insts(block)
                .iter()
                .any(|inst| func.dfg.inst(*inst).is_return())
            {
                p.kind = BlockType::Exit;
            }

            match self.direction {
                Direction::Forward => {
                    if p.kind == BlockType::Entry {
                        p.input = self.boundary.clone();
                    }
                    p.output = self.init.clone();
                }
                Direction::Backward => {
                    if p.kind == BlockType::Exit {
                        p.output = self.boundary.clone();
                    }
                    p.input = self.init.clone();
                }
            }
            props[block] = p;
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use quill_hir::{ControlFlowGraph, FunctionBuilder};

    use super::*;

    struct Reachability;

    impl TransferFunction for Reachability {
        fn debug_name(&self) -> &'static str {
            "reachability"
        }

        fn meet(&self, acc: &mut BitSet, input: &BitSet) {
            *acc |= input;
        }

        fn transfer(&self, _block: Block, props: &mut BlockProps) {
            let mut out = props.input.clone();
            out |= &props.gen_set;
            props.output = out;
        }
    }

    #[test]
    fn empty_domain_converges_in_one_round() {
        let mut fb = FunctionBuilder::new("empty", &[]);
        let a = fb.create_block("a");
        fb.switch_to_block(a);
        fb.ins_ret(None);
        let func = fb.finish();

        let cfg = ControlFlowGraph::compute(&func);
        let solver = DataflowSolver::new(
            0,
            Direction::Forward,
            BitSet::empty(0),
            BitSet::empty(0),
        );
        let results = solver.run(&func, &cfg, &FxHashMap::default(), &Reachability);
        assert_eq!(results.input(a).len(), 0);
        assert_eq!(results.output(a).len(), 0);
        // Single-block function with a return: exit labeling wins.
        assert_eq!(results.props(a).kind, BlockType::Exit);
    }
}
