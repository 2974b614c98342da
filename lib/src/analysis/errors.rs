use crate::cil::InsnId;
use std::fmt;

/// Why the stack effect of an instruction can't be determined
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// The instruction empties the stack (`leave`), so it has no fixed pop count
    StackClearing,

    /// The pop count depends on the enclosing method (`ret` outside of a body)
    VariablePop,

    /// A branch whose operand isn't a target (or a `switch` without a jump table)
    MissingBranchTarget,

    /// A call-style instruction whose operand isn't a method or signature
    MissingCallSignature,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MalformedReason::StackClearing => "clears the stack",
            MalformedReason::VariablePop => "pops a number of values fixed by the method",
            MalformedReason::MissingBranchTarget => "has no branch target",
            MalformedReason::MissingCallSignature => "has no call signature",
        })
    }
}

/// Errors from analysing a single instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Stack behaviour of the instruction can't be classified
    MalformedInstruction {
        instruction: InsnId,
        reason: MalformedReason,
    },

    /// Argument location was asked for an instruction that isn't a call
    NotACallInstruction(InsnId),

    /// Backward scan reached an instruction it can't see past (branch, return, throw, `jmp`)
    ArgumentLocationAmbiguous(InsnId),

    /// Backward scan found more values pushed than the slot consumes
    UnbalancedStack(InsnId),

    /// Backward scan ran off the start of the body
    ArgumentNotFound { call: InsnId },

    /// Two instructions expected to share a basic block don't
    CrossesBlockBoundary { first: InsnId, second: InsnId },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInstruction {
                instruction,
                reason,
            } => write!(f, "{} {}", instruction, reason),
            Error::NotACallInstruction(id) => write!(f, "{} is not a call", id),
            Error::ArgumentLocationAmbiguous(id) => {
                write!(f, "cannot locate arguments past the control transfer at {}", id)
            }
            Error::UnbalancedStack(id) => write!(f, "stack is unbalanced at {}", id),
            Error::ArgumentNotFound { call } => {
                write!(f, "reached the start of the body locating arguments of {}", call)
            }
            Error::CrossesBlockBoundary { first, second } => {
                write!(f, "{} and {} are in different basic blocks", first, second)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Method rejected by the stack verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMethodReport {
    /// Name of the rejected method
    pub method: String,

    /// Instruction at which the inconsistency was detected
    pub instruction: InsnId,

    pub kind: InvalidStackKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidStackKind {
    /// Fallthrough reaches an instruction with a different depth than was recorded for it
    DepthMismatch { recorded: usize, current: usize },

    /// The instruction pops more values than are on the stack
    StackUnderflow { depth: usize, pops: usize },

    /// A branch reaches a target with a different depth than was recorded for it
    BranchTargetMismatch {
        target: InsnId,
        recorded: usize,
        current: usize,
    },

    /// Two exception regions force different depths at the same instruction
    ConflictingRegionEntry { forced: usize, other: usize },

    /// The stack effect of the instruction can't be determined
    Malformed(MalformedReason),
}

impl fmt::Display for InvalidMethodReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: ", self.method, self.instruction)?;
        match &self.kind {
            InvalidStackKind::DepthMismatch { recorded, current } => write!(
                f,
                "stack depth is {} but was recorded as {}",
                current, recorded
            ),
            InvalidStackKind::StackUnderflow { depth, pops } => {
                write!(f, "popping {} values from a stack of depth {}", pops, depth)
            }
            InvalidStackKind::BranchTargetMismatch {
                target,
                recorded,
                current,
            } => write!(
                f,
                "branch to {} with stack depth {} but the target has depth {}",
                target, current, recorded
            ),
            InvalidStackKind::ConflictingRegionEntry { forced, other } => write!(
                f,
                "exception regions force both depth {} and depth {}",
                forced, other
            ),
            InvalidStackKind::Malformed(reason) => write!(f, "instruction {}", reason),
        }
    }
}

impl std::error::Error for InvalidMethodReport {}
