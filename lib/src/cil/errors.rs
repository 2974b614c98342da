use super::{InsnId, Label};
use std::fmt;

/// Errors building the instruction graph of a method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A label is referred to, but never placed
    UnplacedLabel(Label),

    /// A label is placed twice
    DuplicateLabel(Label),

    /// A branch or switch targets a label placed after the last instruction
    BranchToEnd { instruction: InsnId, label: Label },

    /// An exception region starts (try, filter, or handler) after the last instruction
    RegionStartsAtEnd(Label),

    /// A branch target or region boundary refers to an instruction outside of the body
    InstructionOutOfRange(InsnId),

    /// A callee or signature is declared twice with different shapes
    ConflictingDeclaration(String),

    /// Malformed listing
    Listing { line: usize, message: String },
}

impl Error {
    pub(crate) fn listing(line: usize, message: impl Into<String>) -> Error {
        Error::Listing {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnplacedLabel(label) => write!(f, "label {:?} is never placed", label),
            Error::DuplicateLabel(label) => write!(f, "label {:?} is placed twice", label),
            Error::BranchToEnd { instruction, label } => write!(
                f,
                "{} branches to {:?}, which is past the last instruction",
                instruction, label
            ),
            Error::RegionStartsAtEnd(label) => write!(
                f,
                "exception region starts at {:?}, which is past the last instruction",
                label
            ),
            Error::InstructionOutOfRange(id) => write!(f, "{} is outside of the body", id),
            Error::ConflictingDeclaration(name) => {
                write!(f, "{} is declared twice with different signatures", name)
            }
            Error::Listing { line, message } => write!(f, "line {}: {}", line, message),
        }
    }
}

impl std::error::Error for Error {}
