mod builder;
mod cfg;
mod entities;
mod function;
mod instruction;
mod print;
mod verify;

pub use self::{
    builder::FunctionBuilder,
    cfg::{ControlFlowGraph, back_edges, post_order, reverse_post_order},
    entities::{Block, Inst, Value},
    function::{DataFlowGraph, Function, ValueData},
    instruction::{CondCode, InstData, Opcode, Type},
    verify::{VerifyError, verify},
};
