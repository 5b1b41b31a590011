use cranelift_entity::SecondaryMap;
use quill_hir::{Block, ControlFlowGraph, Function};

use crate::{
    BitSet, BlockProps, DataflowSolver, Direction, TransferFunction,
    analyses::ExpressionDomain,
};

/// Backward anticipability: an expression is anticipated at a point when
/// every path to exit evaluates it before any operand is redefined.
struct AnticipatedExpressions;

impl TransferFunction for AnticipatedExpressions {
    fn debug_name(&self) -> &'static str {
        "anticipated"
    }

    fn meet(&self, acc: &mut BitSet, input: &BitSet) {
        *acc &= input;
    }

    // IN = (OUT ∩ ¬KILL) ∪ GEN
    fn transfer(&self, _block: Block, props: &mut BlockProps) {
        let mut input = props.kill_set.complemented();
        input &= &props.output;
        input |= &props.gen_set;
        props.input = input;
    }
}

/// Forward "will be available": the expression has been, or could
/// profitably have been, computed on every path reaching the point.
struct WillBeAvailableExpressions<'a> {
    anticipated_in: &'a SecondaryMap<Block, BitSet>,
}

impl TransferFunction for WillBeAvailableExpressions<'_> {
    fn debug_name(&self) -> &'static str {
        "will-be-available"
    }

    fn meet(&self, acc: &mut BitSet, input: &BitSet) {
        *acc &= input;
    }

    // OUT = (IN ∪ Anticipated.IN) ∩ ¬KILL
    fn transfer(&self, block: Block, props: &mut BlockProps) {
        let mut tmp = self.anticipated_in[block].clone();
        tmp |= &props.input;
        let mut output = props.kill_set.complemented();
        output &= &tmp;
        props.output = output;
    }
}

/// Forward postponability: the insertion of an expression can be delayed
/// past the point without making any path recompute it.
struct PostponableExpressions<'a> {
    earliest: &'a SecondaryMap<Block, BitSet>,
}

impl TransferFunction for PostponableExpressions<'_> {
    fn debug_name(&self) -> &'static str {
        "postponable"
    }

    fn meet(&self, acc: &mut BitSet, input: &BitSet) {
        *acc &= input;
    }

    // OUT = (IN ∪ Earliest) ∩ ¬GEN
    fn transfer(&self, block: Block, props: &mut BlockProps) {
        let mut output = self.earliest[block].clone();
        output |= &props.input;
        let mut gen_complement = props.gen_set.complemented();
        gen_complement &= &output;
        props.output = gen_complement;
    }
}

/// Backward use: the temporary holding the expression will be consumed on
/// some path below the point.
struct UsedExpressions<'a> {
    latest: &'a SecondaryMap<Block, BitSet>,
}

impl TransferFunction for UsedExpressions<'_> {
    fn debug_name(&self) -> &'static str {
        "used"
    }

    fn meet(&self, acc: &mut BitSet, input: &BitSet) {
        *acc |= input;
    }

    // IN = (OUT ∪ GEN) ∩ ¬Latest
    fn transfer(&self, block: Block, props: &mut BlockProps) {
        let mut tmp = props.gen_set.clone();
        tmp |= &props.output;
        let mut input = self.latest[block].complemented();
        input &= &tmp;
        props.input = input;
    }
}

/// The composed lazy-code-motion analysis: the four dataflow passes plus the
/// Earliest/Latest/ToInsert/ToReplace derivations, all over the expression
/// domain of one function.
///
/// The CFG handed in must already be free of critical edges; the rewriter
/// splits them before running this analysis so that every insertion point is
/// a block of its own.
pub struct LazyCodeMotionAnalysis {
    domain: ExpressionDomain,
    anticipated_in: SecondaryMap<Block, BitSet>,
    available_in: SecondaryMap<Block, BitSet>,
    earliest: SecondaryMap<Block, BitSet>,
    postponable_in: SecondaryMap<Block, BitSet>,
    latest: SecondaryMap<Block, BitSet>,
    used_out: SecondaryMap<Block, BitSet>,
    to_insert: SecondaryMap<Block, BitSet>,
    to_replace: SecondaryMap<Block, BitSet>,
}

impl LazyCodeMotionAnalysis {
    pub fn analyze(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let domain = ExpressionDomain::build(func);
        let info = domain.block_info(func);
        let n = domain.len();

        // Anticipated (backward), boundary ∅ at exits, init U.
        let anticipated = DataflowSolver::new(
            n,
            Direction::Backward,
            BitSet::empty(n),
            BitSet::full(n),
        )
        .run(func, cfg, &info, &AnticipatedExpressions);
        let anticipated_in = collect(func, |block| anticipated.input(block).clone());

        // WillBeAvailable (forward), boundary ∅ at entry, init U.
        let available = DataflowSolver::new(
            n,
            Direction::Forward,
            BitSet::empty(n),
            BitSet::full(n),
        )
        .run(
            func,
            cfg,
            &info,
            &WillBeAvailableExpressions {
                anticipated_in: &anticipated_in,
            },
        );
        let available_in = collect(func, |block| available.input(block).clone());

        // Earliest = Anticipated.IN ∩ ¬WillBeAvailable.IN
        let earliest = collect(func, |block| {
            let mut e = available_in[block].complemented();
            e &= &anticipated_in[block];
            e
        });

        // Postponable (forward), boundary ∅ at entry, init U.
        let postponable = DataflowSolver::new(
            n,
            Direction::Forward,
            BitSet::empty(n),
            BitSet::full(n),
        )
        .run(func, cfg, &info, &PostponableExpressions { earliest: &earliest });
        let postponable_in = collect(func, |block| postponable.input(block).clone());

        // Latest = (Earliest ∪ Postponable.IN)
        //        ∩ (GEN ∪ ¬⋂_succ (Earliest ∪ Postponable.IN))
        let latest = collect(func, |block| {
            let mut ok_here = earliest[block].clone();
            ok_here |= &postponable_in[block];

            let mut all_succs_ok = BitSet::full(n);
            for succ in cfg.succs(block) {
                let mut succ_ok = earliest[*succ].clone();
                succ_ok |= &postponable_in[*succ];
                all_succs_ok &= &succ_ok;
            }
            all_succs_ok.complement();
            all_succs_ok |= &info[&block].gen_set;

            ok_here &= &all_succs_ok;
            ok_here
        });

        // Used (backward), boundary ∅, init ∅.
        let used = DataflowSolver::new(
            n,
            Direction::Backward,
            BitSet::empty(n),
            BitSet::empty(n),
        )
        .run(func, cfg, &info, &UsedExpressions { latest: &latest });
        let used_out = collect(func, |block| used.output(block).clone());

        // ToInsert = Used.OUT ∩ Latest: the optimal computation points.
        let to_insert = collect(func, |block| {
            let mut set = used_out[block].clone();
            set &= &latest[block];
            set
        });
        // ToReplace = (Used.OUT ∪ ¬Latest) ∩ GEN: the redundant occurrences.
        let to_replace = collect(func, |block| {
            let mut set = latest[block].complemented();
            set |= &used_out[block];
            set &= &info[&block].gen_set;
            set
        });

        Self {
            domain,
            anticipated_in,
            available_in,
            earliest,
            postponable_in,
            latest,
            used_out,
            to_insert,
            to_replace,
        }
    }

    pub fn domain(&self) -> &ExpressionDomain {
        &self.domain
    }

    pub fn anticipated_in(&self, block: Block) -> &BitSet {
        &self.anticipated_in[block]
    }

    pub fn will_be_available_in(&self, block: Block) -> &BitSet {
        &self.available_in[block]
    }

    pub fn earliest(&self, block: Block) -> &BitSet {
        &self.earliest[block]
    }

    pub fn postponable_in(&self, block: Block) -> &BitSet {
        &self.postponable_in[block]
    }

    pub fn latest(&self, block: Block) -> &BitSet {
        &self.latest[block]
    }

    pub fn used_out(&self, block: Block) -> &BitSet {
        &self.used_out[block]
    }

    pub fn to_insert(&self, block: Block) -> &BitSet {
        &self.to_insert[block]
    }

    pub fn to_replace(&self, block: Block) -> &BitSet {
        &self.to_replace[block]
    }
}

fn collect<F>(func: &Function, mut per_block: F) -> SecondaryMap<Block, BitSet>
where
    F: FnMut(Block) -> BitSet,
{
    let mut map: SecondaryMap<Block, BitSet> = SecondaryMap::new();
    for block in func.blocks() {
        map[block] = per_block(block);
    }
    map
}
