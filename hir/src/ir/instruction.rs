use alloc::string::String;
use core::fmt;

use smallvec::{SmallVec, smallvec};

use super::{Block, Value};

/// The type of an SSA value.
///
/// The optimizer only needs enough type structure to preserve value widths
/// across rewrites and to materialize typed `undef` replacements.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    I1,
    I8,
    I32,
    I64,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I1 => f.write_str("i1"),
            Self::I8 => f.write_str("i8"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
        }
    }
}

/// Binary arithmetic opcodes.
///
/// These are the only instructions which participate in the expression domain
/// used by code motion.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl Opcode {
    /// Returns true if evaluating this operation on arbitrary operands cannot
    /// trap, i.e. it can be executed speculatively on paths where the source
    /// program would not have executed it.
    pub fn is_speculatively_safe(self) -> bool {
        !matches!(self, Self::Div)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer comparison predicates for [`InstData::Icmp`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CondCode {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CondCode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The payload of an instruction.
///
/// Every instruction produces at most one result value, tracked by the
/// data-flow graph rather than in the payload itself.
#[derive(Clone, Debug)]
pub enum InstData {
    /// A binary arithmetic operation.
    Binary { op: Opcode, args: [Value; 2] },
    /// An integer comparison, producing an `i1`.
    Icmp { cond: CondCode, args: [Value; 2] },
    /// A φ node merging one value per predecessor edge.
    ///
    /// Incoming entries are ordered; for loop headers, index 0 is by
    /// convention the entry (preheader/landing-pad) edge.
    Phi { args: SmallVec<[(Block, Value); 2]> },
    /// An unconditional branch.
    Br { dest: Block },
    /// A conditional branch. `then_dest` is the "taken" successor, which for
    /// loop exit tests is the in-loop (body) side.
    CondBr {
        cond: Value,
        then_dest: Block,
        else_dest: Block,
    },
    /// Return from the function.
    Ret { value: Option<Value> },
    /// A call to an external function. Conservatively treated as having
    /// observable side effects.
    Call {
        callee: String,
        args: SmallVec<[Value; 4]>,
    },
    /// A debug intrinsic recording the location of `value`. Never removed,
    /// never a candidate for motion.
    DbgValue { value: Value },
}

impl InstData {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Br { .. } | Self::CondBr { .. } | Self::Ret { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Self::Ret { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary { .. })
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, Self::DbgValue { .. })
    }

    /// Returns true if this instruction has effects observable beyond its
    /// result value.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Self::Call { .. })
    }

    /// All value operands, in slot order. For φ nodes this includes every
    /// incoming value.
    pub fn arguments(&self) -> SmallVec<[Value; 4]> {
        match self {
            Self::Binary { args, .. } | Self::Icmp { args, .. } => SmallVec::from_slice(args),
            Self::Phi { args } => args.iter().map(|(_, value)| *value).collect(),
            Self::Br { .. } => smallvec![],
            Self::CondBr { cond, .. } => smallvec![*cond],
            Self::Ret { value } => value.iter().copied().collect(),
            Self::Call { args, .. } => args.clone(),
            Self::DbgValue { value } => smallvec![*value],
        }
    }

    /// Rewrite every operand slot holding `old` to hold `new` instead.
    pub fn replace_uses_of_value(&mut self, old: Value, new: Value) {
        let replace = |slot: &mut Value| {
            if *slot == old {
                *slot = new;
            }
        };
        match self {
            Self::Binary { args, .. } | Self::Icmp { args, .. } => {
                args.iter_mut().for_each(replace);
            }
            Self::Phi { args } => {
                args.iter_mut().for_each(|(_, value)| replace(value));
            }
            Self::Br { .. } => {}
            Self::CondBr { cond, .. } => replace(cond),
            Self::Ret { value } => {
                if let Some(value) = value.as_mut() {
                    replace(value);
                }
            }
            Self::Call { args, .. } => args.iter_mut().for_each(replace),
            Self::DbgValue { value } => replace(value),
        }
    }

    /// The successor blocks this instruction can transfer control to, in slot
    /// order. Empty for non-terminators and returns.
    pub fn branch_destinations(&self) -> SmallVec<[Block; 2]> {
        match self {
            Self::Br { dest } => smallvec![*dest],
            Self::CondBr {
                then_dest,
                else_dest,
                ..
            } => smallvec![*then_dest, *else_dest],
            _ => smallvec![],
        }
    }

    /// Retarget the destination in the given successor slot.
    ///
    /// Slots are numbered as in [`Self::branch_destinations`]: for a
    /// conditional branch, slot 0 is `then_dest` and slot 1 is `else_dest`.
    pub fn retarget_successor_slot(&mut self, slot: usize, new_dest: Block) {
        match (self, slot) {
            (Self::Br { dest }, 0) => *dest = new_dest,
            (Self::CondBr { then_dest, .. }, 0) => *then_dest = new_dest,
            (Self::CondBr { else_dest, .. }, 1) => *else_dest = new_dest,
            (data, slot) => {
                panic!("no successor slot {slot} on {data:?}")
            }
        }
    }

    /// Incoming `(predecessor, value)` pairs if this is a φ node.
    pub fn phi_args(&self) -> Option<&[(Block, Value)]> {
        match self {
            Self::Phi { args } => Some(args),
            _ => None,
        }
    }

    pub fn phi_args_mut(&mut self) -> Option<&mut SmallVec<[(Block, Value); 2]>> {
        match self {
            Self::Phi { args } => Some(args),
            _ => None,
        }
    }
}
