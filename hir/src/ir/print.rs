use core::fmt;

use super::{Block, Function, Inst, InstData, ValueData};

struct DisplayInst<'a> {
    func: &'a Function,
    inst: Inst,
}

impl fmt::Display for DisplayInst<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dfg = &self.func.dfg;
        if let Some(result) = dfg.result(self.inst) {
            write!(f, "{result} = ")?;
        }
        match dfg.inst(self.inst) {
            InstData::Binary { op, args } => {
                write!(f, "{op} {}, {}", args[0], args[1])
            }
            InstData::Icmp { cond, args } => {
                write!(f, "icmp {cond} {}, {}", args[0], args[1])
            }
            InstData::Phi { args } => {
                f.write_str("phi ")?;
                for (i, (block, value)) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{}: {value}]", self.func.block_label(*block))?;
                }
                Ok(())
            }
            InstData::Br { dest } => {
                write!(f, "br {}", self.func.block_label(*dest))
            }
            InstData::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                write!(
                    f,
                    "br {cond}, {}, {}",
                    self.func.block_label(*then_dest),
                    self.func.block_label(*else_dest)
                )
            }
            InstData::Ret { value: Some(value) } => write!(f, "ret {value}"),
            InstData::Ret { value: None } => f.write_str("ret"),
            InstData::Call { callee, args } => {
                write!(f, "call @{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            InstData::DbgValue { value } => write!(f, "dbg.value {value}"),
        }
    }
}

impl Function {
    /// A printable label for `block`: its name if it has one, its entity id
    /// otherwise.
    pub fn block_label(&self, block: Block) -> BlockLabel<'_> {
        BlockLabel { func: self, block }
    }

    /// Render a single instruction.
    pub fn display_inst(&self, inst: Inst) -> impl fmt::Display + '_ {
        DisplayInst { func: self, inst }
    }
}

pub struct BlockLabel<'a> {
    func: &'a Function,
    block: Block,
}

impl fmt::Display for BlockLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.func.block_name(self.block);
        if name.is_empty() {
            write!(f, "{}", self.block)
        } else {
            f.write_str(name)
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function @{}(", self.name)?;
        for (i, param) in self.params().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}: {}", self.dfg.value_type(*param))?;
        }
        f.write_str(") {\n")?;
        for block in self.blocks() {
            writeln!(f, "{}:", self.block_label(block))?;
            for inst in self.insts(block) {
                writeln!(f, "  {}", self.display_inst(*inst))?;
            }
        }
        f.write_str("}")
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inst { inst, ty } => write!(f, "{ty} result of {inst}"),
            Self::Param { index, ty } => write!(f, "{ty} param #{index}"),
            Self::Const { imm, ty } => write!(f, "{ty} const {imm}"),
            Self::Undef { ty } => write!(f, "{ty} undef"),
        }
    }
}
