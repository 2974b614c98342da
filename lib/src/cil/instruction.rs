use crate::cil::{FlowControl, MethodId, OpCode, SignatureId};
use std::fmt;

/// Stable identity of an instruction inside a [`crate::cil::MethodBody`]
///
/// Instructions are never compared by value: two `ldc.i4 0` in the same body are different
/// instructions. The id is the position of the instruction in the body, so the previous and next
/// instructions in program order are the neighbouring ids.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct InsnId(pub(crate) usize);

impl InsnId {
    /// Position of the instruction in its body
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for InsnId {
    fn from(index: usize) -> InsnId {
        InsnId(index)
    }
}

impl fmt::Debug for InsnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("i{}", self.0))
    }
}

impl fmt::Display for InsnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("IL_{:04}", self.0))
    }
}

/// Operand of an instruction
///
/// Branch targets are plain ids into the same body: they don't own the instruction they point
/// at.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand<'g> {
    None,
    Int(i64),
    Float(f64),
    String(String),

    /// Argument or local variable index
    Variable(u16),

    Target(InsnId),

    /// Jump table of a `switch`
    Targets(Vec<InsnId>),

    /// Callee of `call`, `callvirt`, `newobj`, `jmp`, `ldftn`
    Method(MethodId<'g>),

    /// Standalone signature of `calli`
    Signature(SignatureId<'g>),

    /// Type or field token (only its name is tracked)
    Token(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction<'g> {
    pub opcode: OpCode,
    pub operand: Operand<'g>,
}

impl<'g> Instruction<'g> {
    pub fn new(opcode: OpCode, operand: Operand<'g>) -> Instruction<'g> {
        Instruction { opcode, operand }
    }

    /// Instruction without an operand
    pub fn simple(opcode: OpCode) -> Instruction<'g> {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    pub fn flow_control(&self) -> FlowControl {
        self.opcode.flow_control()
    }

    /// Non-fallthrough targets of the instruction (empty unless the operand holds targets)
    pub fn targets(&self) -> &[InsnId] {
        match &self.operand {
            Operand::Target(target) => std::slice::from_ref(target),
            Operand::Targets(targets) => targets,
            _ => &[],
        }
    }
}

impl<'g> fmt::Display for Instruction<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int(value) => write!(f, " {}", value),
            Operand::Float(value) => write!(f, " {}", value),
            Operand::String(value) => write!(f, " {:?}", value),
            Operand::Variable(index) => write!(f, " {}", index),
            Operand::Target(target) => write!(f, " {}", target),
            Operand::Targets(targets) => {
                f.write_str(" (")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", target)?;
                }
                f.write_str(")")
            }
            Operand::Method(method) => write!(f, " {}", method.name),
            Operand::Signature(signature) => write!(f, " {}", signature.0),
            Operand::Token(token) => write!(f, " {}", token),
        }
    }
}
