use alloc::vec::Vec;

use quill_hir::{
    Block, ControlFlowGraph, Function, FxHashMap, FxHashSet, Inst, InstData, Pass,
    PostPassStatus, smallvec,
};
use quill_hir_analysis::{LoopInfo, analyses::Dominators};

/// Loop rotation through a landing pad.
///
/// For a canonical while-style loop the exit test sits in the header, which
/// blocks any hoisting above it: nothing is anticipated at the header since
/// the zero-trip path skips the body. This transform copies the exit test
/// to the latch, moves the original test into the preheader, and inserts a
/// landing-pad block between the two. The result is a do-while shape whose
/// landing pad dominates the body and serves as the hoist target for
/// loop-invariant code. Definitions leaving the loop are re-unified with φ
/// nodes in the exit block, which now receives control from both the
/// preheader (zero-trip) and the latch.
pub struct LandingPadTransform;

impl Pass for LandingPadTransform {
    fn name(&self) -> &'static str {
        "landing-pad"
    }

    fn argument(&self) -> &'static str {
        "landing-pad"
    }

    fn run_on_function(&mut self, function: &mut Function) -> PostPassStatus {
        let mut changed = PostPassStatus::Unchanged;
        // Rotating a loop reshapes the CFG, so loops are discovered afresh
        // after each rotation, deepest first; headers survive rotation, so
        // they double as the done-markers.
        let mut attempted: FxHashSet<Block> = FxHashSet::default();
        loop {
            let cfg = ControlFlowGraph::compute(function);
            let doms = Dominators::compute(function, &cfg);
            let mut loops = LoopInfo::compute(function, &cfg, &doms);

            let next = (0..loops.len())
                .filter(|index| !attempted.contains(&loops.loops()[*index].header()))
                .max_by_key(|index| loops.depth(*index));
            let Some(index) = next else {
                break;
            };
            attempted.insert(loops.loops()[index].header());
            changed |= rotate_loop(function, &cfg, &mut loops, index);
        }
        changed
    }
}

fn rotate_loop(
    func: &mut Function,
    cfg: &ControlFlowGraph,
    loops: &mut LoopInfo,
    index: usize,
) -> PostPassStatus {
    let header = loops.loops()[index].header();
    let (Some(preheader), Some(latch), Some(exit)) = (
        loops.loops()[index].preheader(func, cfg),
        loops.loops()[index].latch(cfg),
        loops.loops()[index].exit_block(func),
    ) else {
        log::debug!(
            target: "landing-pad",
            "skipping loop at {}: no preheader, latch or unique exit",
            func.block_label(header),
        );
        return PostPassStatus::Unchanged;
    };

    // The rotation needs the exit test in the header, branching into the
    // body on the taken side and to the exit otherwise, with the body
    // distinct from the header itself.
    let header_term = func.terminator(header).expect("header has a terminator");
    let InstData::CondBr {
        then_dest: body_target,
        else_dest,
        ..
    } = *func.dfg.inst(header_term)
    else {
        log::debug!(
            target: "landing-pad",
            "skipping loop at {}: header does not end in an exit test",
            func.block_label(header),
        );
        return PostPassStatus::Unchanged;
    };
    if else_dest != exit || body_target == header || latch == header {
        log::debug!(
            target: "landing-pad",
            "skipping loop at {}: not in rotatable shape",
            func.block_label(header),
        );
        return PostPassStatus::Unchanged;
    }

    let parent = loops.parent_of(index);

    // 1. Carve the landing pad out of the preheader, in front of its
    // branch. Header φs now name the landing pad on their entry edge.
    let landing_pad = func.split_block_before_terminator(preheader, ".landingpad");
    if let Some(parent) = parent {
        loops.add_block_to_loop(parent, landing_pad);
    }

    // 2. Copy the header body (everything but the φs) into the latch, so
    // the latch performs the exit test itself. Cloned branches that went
    // into the body go to the header instead, and cloned instructions refer
    // to each other rather than to the originals.
    let latch_term = func.terminator(latch).expect("latch has a terminator");
    func.erase_inst(latch_term);
    let header_body: Vec<Inst> = func
        .insts(header)
        .iter()
        .copied()
        .filter(|inst| !func.dfg.inst(*inst).is_phi())
        .collect();
    let mut clones: FxHashMap<_, _> = FxHashMap::default();
    for inst in header_body.iter().copied() {
        let mut data = func.dfg.inst(inst).clone();
        if let InstData::CondBr { then_dest, .. } = &mut data
            && *then_dest == body_target
        {
            *then_dest = header;
        }
        let result_ty = func.dfg.result(inst).map(|v| func.dfg.value_type(v));
        let clone = func.append_inst(latch, data, result_ty);
        if let (Some(old), Some(new)) = (func.dfg.result(inst), func.dfg.result(clone)) {
            clones.insert(old, new);
        }
    }
    func.remap_operands_in_block(latch, &clones);

    // 3. Move the original exit test into the preheader. Uses of a header φ
    // are resolved to the φ's entry-edge value (incoming index 0), since on
    // this path the loop has not run yet.
    let preheader_term = func.terminator(preheader).expect("preheader has a terminator");
    func.erase_inst(preheader_term);
    for inst in header_body.iter().copied() {
        func.transfer_inst_to_end(inst, preheader);
    }
    let header_phis: Vec<Inst> = func.insts(header).to_vec();
    for phi in header_phis.iter().copied() {
        let phi_value = func.dfg.result(phi).expect("φ produces a value");
        let entry_value = func.dfg.inst(phi).phi_args().expect("φ")[0].1;
        for inst in func.insts(preheader).to_vec() {
            func.dfg.inst_mut(inst).replace_uses_of_value(phi_value, entry_value);
        }
    }
    let moved_term = func.terminator(preheader).expect("moved test terminates");
    func.dfg.inst_mut(moved_term).retarget_successor_slot(0, landing_pad);
    func.append_inst(header, InstData::Br { dest: body_target }, None);

    // 4. Unify the exit. The loop-exit block now has two incoming edges
    // (preheader and latch); give every header φ a counterpart φ there and
    // route uses outside the loop through it. The exit's original
    // instructions move to a common-exit block below the φs.
    let common_exit = func.split_block_at(exit, 0, ".commonexit");
    if let Some(parent) = parent {
        loops.add_block_to_loop(parent, common_exit);
    }
    for phi in header_phis.iter().copied() {
        let phi_value = func.dfg.result(phi).expect("φ produces a value");
        let entry_value = func.dfg.inst(phi).phi_args().expect("φ")[0].1;
        let prev_users = func.users(phi_value);

        let ty = func.dfg.value_type(phi_value);
        let exit_phi = func.insert_inst(
            exit,
            0,
            InstData::Phi {
                args: smallvec![(latch, phi_value), (preheader, entry_value)],
            },
            Some(ty),
        );
        let exit_value = func.dfg.result(exit_phi).expect("φ produces a value");

        for user in prev_users {
            if user == exit_phi {
                continue;
            }
            let Some(user_block) = func.inst_block(user) else {
                continue;
            };
            if loops.loops()[index].contains_block(user_block) {
                continue;
            }
            func.dfg.inst_mut(user).replace_uses_of_value(phi_value, exit_value);
        }
    }

    log::debug!(
        target: "landing-pad",
        "rotated loop at {} through {}",
        func.block_label(header),
        func.block_label(landing_pad),
    );
    PostPassStatus::Changed
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use quill_hir::{
        CondCode, FunctionBuilder, InstData, Opcode, Pass, PostPassStatus, Type, verify,
    };

    use super::LandingPadTransform;

    /// `while (i < n) { i = i + 1 } return i` becomes a guarded do-while:
    /// the header is reduced to an unconditional branch into the body, the
    /// latch re-tests the condition, and the returned value is routed
    /// through a φ unifying the zero-trip and loop-exit definitions.
    #[test]
    fn rotates_while_loop() {
        let mut fb = FunctionBuilder::new("count", &[Type::I32]);
        let n = fb.param(0);
        let pre = fb.create_block("preheader");
        let header = fb.create_block("header");
        let body = fb.create_block("body");
        let exit = fb.create_block("exit");
        fb.switch_to_block(pre);
        let zero = fb.iconst(Type::I32, 0);
        let one = fb.iconst(Type::I32, 1);
        fb.ins_br(header);
        fb.switch_to_block(header);
        // Incoming index 0 is the entry edge by convention.
        let i = fb.ins_phi(Type::I32, &[(pre, zero), (body, zero)]);
        let cond = fb.ins_icmp(CondCode::Lt, i, n);
        fb.ins_cond_br(cond, body, exit);
        fb.switch_to_block(body);
        let next = fb.ins_binary(Opcode::Add, Type::I32, i, one);
        fb.ins_br(header);
        fb.switch_to_block(exit);
        fb.ins_ret(Some(i));
        let mut func = fb.finish();
        // Patch the φ's latch incoming to the increment.
        let phi_inst = func.insts(header)[0];
        func.dfg
            .inst_mut(phi_inst)
            .phi_args_mut()
            .unwrap()[1]
            .1 = next;
        verify(&func).unwrap();

        let status = LandingPadTransform.run_on_function(&mut func);
        assert_eq!(status, PostPassStatus::Changed);
        verify(&func).unwrap();

        // The header now falls straight through into the body.
        let header_term = func.terminator(header).unwrap();
        assert!(matches!(
            func.dfg.inst(header_term),
            InstData::Br { dest } if *dest == body
        ));
        assert_eq!(func.insts(header).len(), 2); // φ + br

        // The latch ends in the copied exit test: into the header to keep
        // looping, to the unified exit otherwise.
        let latch_term = func.terminator(body).unwrap();
        assert!(matches!(
            func.dfg.inst(latch_term),
            InstData::CondBr { then_dest, else_dest, .. }
                if *then_dest == header && *else_dest == exit
        ));

        // The preheader performs the zero-trip test on the entry values and
        // enters the loop through the landing pad.
        let pre_term = func.terminator(pre).unwrap();
        let InstData::CondBr {
            cond: pre_cond,
            then_dest: landing_pad,
            else_dest,
        } = *func.dfg.inst(pre_term)
        else {
            panic!("preheader should end in the moved exit test");
        };
        assert_eq!(else_dest, exit);
        assert_eq!(func.block_name(landing_pad), ".landingpad");
        assert_eq!(func.successors(landing_pad).as_slice(), &[header][..]);
        // The moved test no longer references the φ: it tests the entry
        // value directly.
        let cond_def = func.dfg.value_def(pre_cond).unwrap();
        assert_eq!(func.inst_block(cond_def), Some(pre));
        let phi_value = func.dfg.result(phi_inst).unwrap();
        assert!(!func
            .dfg
            .inst(cond_def)
            .arguments()
            .contains(&phi_value));

        // The exit block unifies both reaching definitions of i, and the
        // return (now in the common exit) uses the unified φ.
        let exit_phi = func.insts(exit)[0];
        let incoming = func.dfg.inst(exit_phi).phi_args().unwrap();
        assert_eq!(incoming.len(), 2);
        let exit_value = func.dfg.result(exit_phi).expect("φ produces a value");
        let common_exit = func.successors(exit)[0];
        assert_eq!(func.block_name(common_exit), ".commonexit");
        let ret = func.terminator(common_exit).unwrap();
        assert!(matches!(
            func.dfg.inst(ret),
            InstData::Ret { value: Some(v) } if *v == exit_value
        ));
    }

    /// A loop without the required shape (here: no unique exit) is left
    /// untouched.
    #[test]
    fn skips_multi_exit_loops() {
        let mut fb = FunctionBuilder::new("multi_exit", &[Type::I32]);
        let n = fb.param(0);
        let pre = fb.create_block("preheader");
        let header = fb.create_block("header");
        let body = fb.create_block("body");
        let exit_a = fb.create_block("exit_a");
        let exit_b = fb.create_block("exit_b");
        fb.switch_to_block(pre);
        fb.ins_br(header);
        fb.switch_to_block(header);
        let c0 = fb.ins_icmp(CondCode::Lt, n, n);
        fb.ins_cond_br(c0, body, exit_a);
        fb.switch_to_block(body);
        let c1 = fb.ins_icmp(CondCode::Gt, n, n);
        fb.ins_cond_br(c1, header, exit_b);
        fb.switch_to_block(exit_a);
        fb.ins_ret(None);
        fb.switch_to_block(exit_b);
        fb.ins_ret(None);
        let mut func = fb.finish();

        let blocks_before = func.num_blocks();
        let status = LandingPadTransform.run_on_function(&mut func);
        assert_eq!(status, PostPassStatus::Unchanged);
        assert_eq!(func.num_blocks(), blocks_before);
    }
}
