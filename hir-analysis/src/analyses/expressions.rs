use alloc::vec::Vec;
use core::fmt;

use quill_hir::{Block, Function, FxHashMap, Inst, InstData, Opcode, Type, Value};

use crate::{BitSet, BlockInfo};

/// A canonical binary expression: an opcode applied to two SSA values.
///
/// Equality and ordering are by operand identity in slot order; operands are
/// deliberately not commuted, so `a + b` and `b + a` are distinct atoms.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Expression {
    pub op: Opcode,
    pub lhs: Value,
    pub rhs: Value,
}

impl Expression {
    /// The expression computed by `inst`, if it is a binary operator.
    pub fn from_inst(func: &Function, inst: Inst) -> Option<Self> {
        match *func.dfg.inst(inst) {
            InstData::Binary { op, args } => Some(Self {
                op,
                lhs: args[0],
                rhs: args[1],
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.op, self.lhs, self.rhs)
    }
}

/// The expression domain of a function: every distinct binary expression,
/// with a stable index per atom.
pub struct ExpressionDomain {
    exprs: Vec<Expression>,
    indices: FxHashMap<Expression, usize>,
}

impl ExpressionDomain {
    /// Scan every instruction and collect the deduplicated expression set in
    /// first-occurrence order.
    pub fn build(func: &Function) -> Self {
        let mut exprs = Vec::new();
        let mut indices = FxHashMap::default();
        for block in func.blocks() {
            for inst in func.insts(block) {
                if let Some(expr) = Expression::from_inst(func, *inst)
                    && !indices.contains_key(&expr)
                {
                    indices.insert(expr, exprs.len());
                    exprs.push(expr);
                }
            }
        }
        Self { exprs, indices }
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn get(&self, index: usize) -> Expression {
        self.exprs[index]
    }

    pub fn index_of(&self, expr: &Expression) -> Option<usize> {
        self.indices.get(expr).copied()
    }

    /// The result type an expression's temporary should have, taken from its
    /// left operand.
    pub fn expr_type(&self, func: &Function, index: usize) -> Type {
        func.dfg.value_type(self.exprs[index].lhs)
    }

    /// GEN/KILL over the expression domain, one forward pass per block.
    ///
    /// A binary op generates its own expression; any instruction defining a
    /// value — binary, φ, comparison or call — kills (and un-generates)
    /// every expression using that value. In SSA "redefinition" means the
    /// block holds the operand's unique definition, which is exactly what
    /// keeps an expression from being hoisted above a φ merging its operand.
    pub fn block_info(&self, func: &Function) -> FxHashMap<Block, BlockInfo> {
        let n = self.len();
        let mut info = FxHashMap::default();
        for block in func.blocks() {
            let mut gen_set = BitSet::empty(n);
            let mut kill_set = BitSet::empty(n);
            for inst in func.insts(block).iter().copied() {
                if let Some(expr) = Expression::from_inst(func, inst)
                    && let Some(index) = self.index_of(&expr)
                {
                    gen_set.set(index);
                }
                if let Some(result) = func.dfg.result(inst) {
                    for (index, expr) in self.exprs.iter().enumerate() {
                        if expr.lhs == result || expr.rhs == result {
                            kill_set.set(index);
                            gen_set.reset(index);
                        }
                    }
                }
            }
            info.insert(block, BlockInfo { gen_set, kill_set });
        }
        info
    }
}
