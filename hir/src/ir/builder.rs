use smallvec::SmallVec;

use super::{Block, CondCode, Function, InstData, Opcode, Type, Value};

/// A convenience layer for constructing functions block by block.
///
/// The builder tracks a current block; `ins_*` methods append to it. Blocks
/// must receive their φ nodes before any other instruction, and exactly one
/// terminator as their final instruction.
pub struct FunctionBuilder {
    func: Function,
    current: Option<Block>,
}

impl FunctionBuilder {
    pub fn new(name: &str, param_types: &[Type]) -> Self {
        Self {
            func: Function::new(name, param_types),
            current: None,
        }
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn param(&self, index: usize) -> Value {
        self.func.param(index)
    }

    pub fn iconst(&mut self, ty: Type, imm: i64) -> Value {
        self.func.dfg.iconst(ty, imm)
    }

    pub fn create_block(&mut self, name: &str) -> Block {
        self.func.create_block(name)
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.current = Some(block);
    }

    fn current(&self) -> Block {
        self.current.expect("no current block; call switch_to_block first")
    }

    fn append(&mut self, data: InstData, result_ty: Option<Type>) -> Option<Value> {
        let block = self.current();
        debug_assert!(
            self.func.terminator(block).is_none(),
            "cannot append to a terminated block"
        );
        let inst = self.func.append_inst(block, data, result_ty);
        self.func.dfg.result(inst)
    }

    pub fn ins_binary(&mut self, op: Opcode, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.append(InstData::Binary { op, args: [lhs, rhs] }, Some(ty))
            .unwrap()
    }

    pub fn ins_icmp(&mut self, cond: CondCode, lhs: Value, rhs: Value) -> Value {
        self.append(InstData::Icmp { cond, args: [lhs, rhs] }, Some(Type::I1))
            .unwrap()
    }

    /// Insert a φ node. Must precede all non-φ instructions of the block.
    pub fn ins_phi(&mut self, ty: Type, incoming: &[(Block, Value)]) -> Value {
        let block = self.current();
        debug_assert_eq!(
            self.func.first_non_phi_index(block),
            self.func.insts(block).len(),
            "φ nodes must be grouped at the top of the block"
        );
        let args = SmallVec::from_slice(incoming);
        self.append(InstData::Phi { args }, Some(ty)).unwrap()
    }

    pub fn ins_br(&mut self, dest: Block) {
        self.append(InstData::Br { dest }, None);
    }

    pub fn ins_cond_br(&mut self, cond: Value, then_dest: Block, else_dest: Block) {
        self.append(
            InstData::CondBr {
                cond,
                then_dest,
                else_dest,
            },
            None,
        );
    }

    pub fn ins_ret(&mut self, value: Option<Value>) {
        self.append(InstData::Ret { value }, None);
    }

    pub fn ins_call(&mut self, callee: &str, args: &[Value], result_ty: Type) -> Value {
        self.append(
            InstData::Call {
                callee: callee.into(),
                args: SmallVec::from_slice(args),
            },
            Some(result_ty),
        )
        .unwrap()
    }

    pub fn ins_dbg_value(&mut self, value: Value) {
        self.append(InstData::DbgValue { value }, None);
    }

    pub fn finish(self) -> Function {
        self.func
    }
}
