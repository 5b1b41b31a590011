#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod ir;
mod pass;

pub use smallvec::{SmallVec, smallvec};

pub type FxHashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;
pub type FxHashSet<K> = hashbrown::HashSet<K, rustc_hash::FxBuildHasher>;

pub use self::{
    ir::{
        Block, CondCode, ControlFlowGraph, DataFlowGraph, Function, FunctionBuilder, Inst,
        InstData, Opcode, Type, Value, ValueData, VerifyError, back_edges, post_order,
        reverse_post_order, verify,
    },
    pass::{Pass, PostPassStatus},
};

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        ControlFlowGraph, FunctionBuilder, InstData, Opcode, Type, post_order,
        reverse_post_order, verify,
    };

    #[test]
    fn build_and_verify_diamond() {
        let mut fb = FunctionBuilder::new("diamond", &[Type::I32, Type::I32]);
        let x = fb.param(0);
        let y = fb.param(1);
        let a = fb.create_block("a");
        let b = fb.create_block("b");
        let c = fb.create_block("c");
        let m = fb.create_block("m");

        fb.switch_to_block(a);
        let cond = fb.ins_icmp(crate::CondCode::Lt, x, y);
        fb.ins_cond_br(cond, b, c);
        fb.switch_to_block(b);
        let t1 = fb.ins_binary(Opcode::Add, Type::I32, x, y);
        fb.ins_br(m);
        fb.switch_to_block(c);
        fb.ins_br(m);
        fb.switch_to_block(m);
        let merged = fb.ins_phi(Type::I32, &[(b, t1), (c, x)]);
        fb.ins_ret(Some(merged));
        let func = fb.finish();

        verify(&func).unwrap();

        let cfg = ControlFlowGraph::compute(&func);
        assert_eq!(cfg.preds(m), &[b, c][..]);
        assert_eq!(cfg.succs(a), &[b, c][..]);

        let po = post_order(&func);
        assert_eq!(po.last().copied(), Some(a));
        let rpo = reverse_post_order(&func);
        assert_eq!(rpo.first().copied(), Some(a));
        assert_eq!(po.len(), 4);
    }

    #[test]
    fn split_edge_rewrites_one_phi_entry() {
        let mut fb = FunctionBuilder::new("split", &[Type::I32]);
        let x = fb.param(0);
        let a = fb.create_block("a");
        let m = fb.create_block("m");
        fb.switch_to_block(a);
        let cond = fb.ins_icmp(crate::CondCode::Eq, x, x);
        // Both slots target the same block: two distinct edges.
        fb.ins_cond_br(cond, m, m);
        fb.switch_to_block(m);
        let one = fb.iconst(Type::I32, 1);
        let two = fb.iconst(Type::I32, 2);
        let phi = fb.ins_phi(Type::I32, &[(a, one), (a, two)]);
        fb.ins_ret(Some(phi));
        let mut func = fb.finish();

        let s0 = func.split_edge(a, 0, "a.m.crit0");
        let s1 = func.split_edge(a, 1, "a.m.crit1");
        verify(&func).unwrap();

        let phi_inst = func.insts(m)[0];
        let args = func.dfg.inst(phi_inst).phi_args().unwrap().to_vec();
        assert_eq!(args, alloc::vec![(s0, one), (s1, two)]);
    }

    #[test]
    fn split_block_redirects_successor_phis() {
        let mut fb = FunctionBuilder::new("split_block", &[Type::I32]);
        let x = fb.param(0);
        let a = fb.create_block("a");
        let b = fb.create_block("b");
        fb.switch_to_block(a);
        let t = fb.ins_binary(Opcode::Add, Type::I32, x, x);
        fb.ins_br(b);
        fb.switch_to_block(b);
        let phi = fb.ins_phi(Type::I32, &[(a, t)]);
        fb.ins_ret(Some(phi));
        let mut func = fb.finish();

        let tail = func.split_block_before_terminator(a, "a.tail");
        verify(&func).unwrap();

        assert_eq!(func.insts(a).len(), 2);
        assert_eq!(func.successors(a).as_slice(), &[tail][..]);
        let phi_inst = func.insts(b)[0];
        let args = func.dfg.inst(phi_inst).phi_args().unwrap();
        assert_eq!(args[0].0, tail);
    }

    #[test]
    fn verifier_rejects_unterminated_block() {
        let mut fb = FunctionBuilder::new("bad", &[]);
        let a = fb.create_block("a");
        fb.switch_to_block(a);
        let mut func = fb.finish();
        assert!(verify(&func).is_err());

        func.append_inst(a, InstData::Ret { value: None }, None);
        assert!(verify(&func).is_ok());
    }
}
