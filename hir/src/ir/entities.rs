use cranelift_entity::entity_impl;

/// An opaque reference to a basic block in a [`Function`](super::Function).
///
/// Blocks are allocated from an arena owned by the function, and remain valid
/// for the lifetime of that function, even if removed from the layout.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an instruction in a [`Function`](super::Function).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to an SSA value.
///
/// Values are defined by instructions, function parameters, or materialized
/// constants/undefs. Identity of a `Value` is the identity of its definition,
/// which is what the expression-level analyses compare.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");
