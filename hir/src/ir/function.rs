use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use cranelift_entity::{PrimaryMap, SecondaryMap, packed_option::PackedOption};
use smallvec::SmallVec;

use super::{Block, Inst, InstData, Type, Value};
use crate::FxHashMap;

/// How an SSA value comes into existence.
#[derive(Clone, Debug)]
pub enum ValueData {
    /// The single result of an instruction.
    Inst { inst: Inst, ty: Type },
    /// A function parameter.
    Param { index: usize, ty: Type },
    /// An integer constant.
    Const { imm: i64, ty: Type },
    /// An undefined value, used to detach erased definitions from any
    /// remaining uses.
    Undef { ty: Type },
}

impl ValueData {
    pub fn ty(&self) -> Type {
        match self {
            Self::Inst { ty, .. }
            | Self::Param { ty, .. }
            | Self::Const { ty, .. }
            | Self::Undef { ty } => *ty,
        }
    }
}

/// Instruction and value arenas for a function.
///
/// Instructions and values are never deallocated individually; erasing an
/// instruction detaches it from the layout and leaves the arena slot behind.
/// Everything is dropped together with the function.
pub struct DataFlowGraph {
    insts: PrimaryMap<Inst, InstData>,
    values: PrimaryMap<Value, ValueData>,
    results: SecondaryMap<Inst, PackedOption<Value>>,
}

impl Default for DataFlowGraph {
    fn default() -> Self {
        Self {
            insts: PrimaryMap::new(),
            values: PrimaryMap::new(),
            results: SecondaryMap::new(),
        }
    }
}

impl DataFlowGraph {
    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.insts[inst]
    }

    pub fn inst_mut(&mut self, inst: Inst) -> &mut InstData {
        &mut self.insts[inst]
    }

    /// The result value of `inst`, if it produces one.
    pub fn result(&self, inst: Inst) -> Option<Value> {
        self.results[inst].expand()
    }

    pub fn value_data(&self, value: Value) -> &ValueData {
        &self.values[value]
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.values[value].ty()
    }

    /// The instruction defining `value`, or `None` for parameters, constants
    /// and undefs.
    pub fn value_def(&self, value: Value) -> Option<Inst> {
        match self.values[value] {
            ValueData::Inst { inst, .. } => Some(inst),
            _ => None,
        }
    }

    /// Returns true if `value` is a constant (including undef).
    pub fn is_const(&self, value: Value) -> bool {
        matches!(
            self.values[value],
            ValueData::Const { .. } | ValueData::Undef { .. }
        )
    }

    pub fn iconst(&mut self, ty: Type, imm: i64) -> Value {
        self.values.push(ValueData::Const { imm, ty })
    }

    pub fn undef(&mut self, ty: Type) -> Value {
        self.values.push(ValueData::Undef { ty })
    }

    pub(crate) fn make_param(&mut self, index: usize, ty: Type) -> Value {
        self.values.push(ValueData::Param { index, ty })
    }

    /// Allocate an instruction, and its result value when `result_ty` is
    /// given. The instruction is not attached to any block.
    pub(crate) fn make_inst(&mut self, data: InstData, result_ty: Option<Type>) -> Inst {
        let inst = self.insts.push(data);
        if let Some(ty) = result_ty {
            let result = self.values.push(ValueData::Inst { inst, ty });
            self.results[inst] = result.into();
        }
        inst
    }
}

#[derive(Clone, Default)]
struct BlockData {
    name: String,
    insts: Vec<Inst>,
}

/// A function: a named CFG of basic blocks over an SSA data-flow graph.
///
/// The first block in the layout is the entry block. Successors are derived
/// from block terminators; predecessors are computed on demand by
/// [`ControlFlowGraph`](super::ControlFlowGraph).
pub struct Function {
    pub name: String,
    pub dfg: DataFlowGraph,
    blocks: PrimaryMap<Block, BlockData>,
    block_order: Vec<Block>,
    inst_block: SecondaryMap<Inst, PackedOption<Block>>,
    params: Vec<Value>,
}

impl Function {
    pub fn new(name: &str, param_types: &[Type]) -> Self {
        let mut dfg = DataFlowGraph::default();
        let params = param_types
            .iter()
            .enumerate()
            .map(|(index, ty)| dfg.make_param(index, *ty))
            .collect();
        Self {
            name: name.to_string(),
            dfg,
            blocks: PrimaryMap::new(),
            block_order: Vec::new(),
            inst_block: SecondaryMap::new(),
            params,
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Value {
        self.params[index]
    }

    /// Append a new, empty block to the end of the layout.
    pub fn create_block(&mut self, name: &str) -> Block {
        let block = self.blocks.push(BlockData {
            name: name.to_string(),
            insts: Vec::new(),
        });
        self.block_order.push(block);
        block
    }

    /// Create a new, empty block placed in the layout immediately after
    /// `after`.
    pub fn create_block_after(&mut self, after: Block, name: &str) -> Block {
        let block = self.blocks.push(BlockData {
            name: name.to_string(),
            insts: Vec::new(),
        });
        let pos = self
            .block_order
            .iter()
            .position(|b| *b == after)
            .expect("block is not in the layout");
        self.block_order.insert(pos + 1, block);
        block
    }

    pub fn entry_block(&self) -> Block {
        self.block_order[0]
    }

    /// Blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.block_order.iter().copied()
    }

    pub fn num_blocks(&self) -> usize {
        self.block_order.len()
    }

    pub fn block_name(&self, block: Block) -> &str {
        &self.blocks[block].name
    }

    pub fn set_block_name(&mut self, block: Block, name: &str) {
        self.blocks[block].name = name.to_string();
    }

    /// Instructions of `block` in program order.
    pub fn insts(&self, block: Block) -> &[Inst] {
        &self.blocks[block].insts
    }

    /// The block containing `inst`, if it is attached to one.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_block[inst].expand()
    }

    /// The terminator of `block`, if its last instruction is one.
    pub fn terminator(&self, block: Block) -> Option<Inst> {
        let inst = *self.blocks[block].insts.last()?;
        self.dfg.inst(inst).is_terminator().then_some(inst)
    }

    /// Successor blocks of `block`, in terminator slot order. May contain
    /// duplicates when two slots target the same block.
    pub fn successors(&self, block: Block) -> SmallVec<[Block; 2]> {
        match self.terminator(block) {
            Some(inst) => self.dfg.inst(inst).branch_destinations(),
            None => SmallVec::new(),
        }
    }

    /// The index of the first non-φ instruction in `block`; this is the
    /// insertion point for materialized temporaries.
    pub fn first_non_phi_index(&self, block: Block) -> usize {
        self.blocks[block]
            .insts
            .iter()
            .position(|inst| !self.dfg.inst(*inst).is_phi())
            .unwrap_or(self.blocks[block].insts.len())
    }

    /// Append an instruction to the end of `block`, allocating a result value
    /// when `result_ty` is given.
    pub fn append_inst(&mut self, block: Block, data: InstData, result_ty: Option<Type>) -> Inst {
        let inst = self.dfg.make_inst(data, result_ty);
        self.blocks[block].insts.push(inst);
        self.inst_block[inst] = block.into();
        inst
    }

    /// Insert an instruction at `index` within `block`.
    pub fn insert_inst(
        &mut self,
        block: Block,
        index: usize,
        data: InstData,
        result_ty: Option<Type>,
    ) -> Inst {
        let inst = self.dfg.make_inst(data, result_ty);
        self.blocks[block].insts.insert(index, inst);
        self.inst_block[inst] = block.into();
        inst
    }

    /// Detach `inst` from its block. The instruction's arena slot (and result
    /// value, if any) remain allocated but unreachable from the layout.
    pub fn erase_inst(&mut self, inst: Inst) {
        if let Some(block) = self.inst_block[inst].take() {
            self.blocks[block].insts.retain(|i| *i != inst);
        }
    }

    /// Move `inst` from wherever it is to the end of `to`.
    pub fn transfer_inst_to_end(&mut self, inst: Inst, to: Block) {
        self.erase_inst(inst);
        self.blocks[to].insts.push(inst);
        self.inst_block[inst] = to.into();
    }

    /// Move `inst` to just before the terminator of `to`.
    pub fn move_inst_before_terminator(&mut self, inst: Inst, to: Block) {
        debug_assert!(
            self.terminator(to).is_some(),
            "target block has no terminator"
        );
        self.erase_inst(inst);
        let pos = self.blocks[to].insts.len() - 1;
        self.blocks[to].insts.insert(pos, inst);
        self.inst_block[inst] = to.into();
    }

    /// Rewrite every use of `old` anywhere in the function to `new`.
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        for block in self.block_order.iter().copied() {
            for inst in self.blocks[block].insts.iter().copied() {
                self.dfg.insts[inst].replace_uses_of_value(old, new);
            }
        }
    }

    /// Rewrite operands of every instruction in `block` through `map`.
    pub fn remap_operands_in_block(&mut self, block: Block, map: &FxHashMap<Value, Value>) {
        for inst in self.blocks[block].insts.clone() {
            for (old, new) in map.iter() {
                self.dfg.insts[inst].replace_uses_of_value(*old, *new);
            }
        }
    }

    /// Instructions (attached to the layout) that use `value` as an operand.
    pub fn users(&self, value: Value) -> Vec<Inst> {
        let mut users = Vec::new();
        for block in self.block_order.iter().copied() {
            for inst in self.blocks[block].insts.iter().copied() {
                if self.dfg.inst(inst).arguments().contains(&value) {
                    users.push(inst);
                }
            }
        }
        users
    }

    pub fn has_uses(&self, value: Value) -> bool {
        self.block_order.iter().any(|block| {
            self.blocks[*block]
                .insts
                .iter()
                .any(|inst| self.dfg.inst(*inst).arguments().contains(&value))
        })
    }

    /// Split `block` in two at instruction index `index`.
    ///
    /// Instructions from `index` onward move to a new block named `name`,
    /// placed immediately after `block` in the layout; `block` is terminated
    /// with an unconditional branch to the new block. φ nodes in the moved
    /// terminator's successors are updated to name the new block as their
    /// incoming predecessor.
    pub fn split_block_at(&mut self, block: Block, index: usize, name: &str) -> Block {
        let new_block = self.create_block_after(block, name);
        let moved = self.blocks[block].insts.split_off(index);
        for inst in moved.iter().copied() {
            self.inst_block[inst] = new_block.into();
        }
        self.blocks[new_block].insts = moved;
        self.append_inst(block, InstData::Br { dest: new_block }, None);

        // All control-flow edges out of `block` now originate from the new
        // block, so redirect incoming-φ predecessors in the targets.
        for succ in self.successors(new_block) {
            self.rewrite_phi_incoming_block(succ, block, new_block);
        }
        new_block
    }

    /// Split `block` immediately before its terminator, leaving the
    /// terminator alone in the new block.
    pub fn split_block_before_terminator(&mut self, block: Block, name: &str) -> Block {
        debug_assert!(self.terminator(block).is_some(), "block has no terminator");
        let index = self.blocks[block].insts.len() - 1;
        self.split_block_at(block, index, name)
    }

    /// Split the control-flow edge leaving `pred` through successor slot
    /// `slot`, inserting a block containing only a branch to the old target.
    ///
    /// Exactly one φ incoming entry per φ node in the target is rewritten, so
    /// splitting each slot of a terminator with duplicate targets consumes
    /// one entry per split.
    pub fn split_edge(&mut self, pred: Block, slot: usize, name: &str) -> Block {
        let term = self.terminator(pred).expect("predecessor has no terminator");
        let target = self.dfg.inst(term).branch_destinations()[slot];
        let new_block = self.create_block_after(pred, name);
        self.append_inst(new_block, InstData::Br { dest: target }, None);
        self.dfg.inst_mut(term).retarget_successor_slot(slot, new_block);
        self.rewrite_one_phi_incoming(target, pred, new_block);
        new_block
    }

    /// In every φ of `block`, rewrite every incoming entry naming `old_pred`
    /// to name `new_pred`.
    pub fn rewrite_phi_incoming_block(&mut self, block: Block, old_pred: Block, new_pred: Block) {
        for inst in self.blocks[block].insts.clone() {
            if let Some(args) = self.dfg.insts[inst].phi_args_mut() {
                for (pred, _) in args.iter_mut() {
                    if *pred == old_pred {
                        *pred = new_pred;
                    }
                }
            }
        }
    }

    /// In every φ of `block`, rewrite the first incoming entry naming
    /// `old_pred` to name `new_pred`.
    fn rewrite_one_phi_incoming(&mut self, block: Block, old_pred: Block, new_pred: Block) {
        for inst in self.blocks[block].insts.clone() {
            if let Some(args) = self.dfg.insts[inst].phi_args_mut()
                && let Some((pred, _)) = args.iter_mut().find(|(pred, _)| *pred == old_pred)
            {
                *pred = new_pred;
            }
        }
    }
}
