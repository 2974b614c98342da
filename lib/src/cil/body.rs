use crate::cil::{Error, InsnId, Instruction, OpCode};
use std::ops::Index;

/// Kind of handler attached to a protected region
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum HandlerKind {
    Catch,
    Filter,
    Finally,
    Fault,
}

impl HandlerKind {
    /// Stack depth on entry to the handler (and to the filter, if there is one)
    ///
    /// Catch and filter blocks start with the exception object on the stack.
    pub fn entry_depth(self) -> usize {
        match self {
            HandlerKind::Catch | HandlerKind::Filter => 1,
            HandlerKind::Finally | HandlerKind::Fault => 0,
        }
    }
}

/// Protected region and its handler
///
/// Ends are exclusive: they point at the first instruction _after_ the range, and are `None`
/// when the range runs to the end of the body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExceptionRegion {
    pub try_start: InsnId,
    pub try_end: Option<InsnId>,
    pub kind: HandlerKind,

    /// Only present for [`HandlerKind::Filter`]
    pub filter_start: Option<InsnId>,

    pub handler_start: InsnId,
    pub handler_end: Option<InsnId>,
}

impl ExceptionRegion {
    /// Every instruction at which one of the ranges of this region begins or ends
    pub fn boundaries(&self) -> impl Iterator<Item = InsnId> {
        [
            Some(self.try_start),
            self.try_end,
            self.filter_start,
            Some(self.handler_start),
            self.handler_end,
        ]
        .into_iter()
        .flatten()
    }

    /// Program points where the stack depth is dictated by the region, rather than by the
    /// instructions flowing into them
    pub fn forced_entries(&self) -> impl Iterator<Item = (InsnId, usize)> {
        let handler_depth = self.kind.entry_depth();
        [
            Some((self.try_start, 0)),
            self.filter_start.map(|start| (start, handler_depth)),
            Some((self.handler_start, handler_depth)),
        ]
        .into_iter()
        .flatten()
    }
}

/// Instructions of one method, in program order, along with its exception regions
///
/// The body is read-only once built: analyses borrow it and never modify it.
#[derive(Clone, Debug)]
pub struct MethodBody<'g> {
    /// Name used in diagnostics
    pub name: String,

    /// Does `ret` pop a return value?
    pub returns_value: bool,

    instructions: Vec<Instruction<'g>>,

    exception_regions: Vec<ExceptionRegion>,
}

impl<'g> MethodBody<'g> {
    /// Assemble a body, checking that every branch target and region boundary is in range
    pub fn new(
        name: impl Into<String>,
        returns_value: bool,
        instructions: Vec<Instruction<'g>>,
        exception_regions: Vec<ExceptionRegion>,
    ) -> Result<MethodBody<'g>, Error> {
        let len = instructions.len();
        let in_range = |id: InsnId| {
            if id.0 < len {
                Ok(())
            } else {
                Err(Error::InstructionOutOfRange(id))
            }
        };

        for instruction in &instructions {
            for target in instruction.targets() {
                in_range(*target)?;
            }
        }
        for region in &exception_regions {
            for boundary in region.boundaries() {
                in_range(boundary)?;
            }
        }

        Ok(MethodBody {
            name: name.into(),
            returns_value,
            instructions,
            exception_regions,
        })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, id: InsnId) -> Option<&Instruction<'g>> {
        self.instructions.get(id.0)
    }

    pub fn exception_regions(&self) -> &[ExceptionRegion] {
        &self.exception_regions
    }

    pub fn first(&self) -> Option<InsnId> {
        if self.instructions.is_empty() {
            None
        } else {
            Some(InsnId(0))
        }
    }

    pub fn last(&self) -> Option<InsnId> {
        self.instructions.len().checked_sub(1).map(InsnId)
    }

    /// Instruction before this one in program order
    pub fn previous(&self, id: InsnId) -> Option<InsnId> {
        id.0.checked_sub(1).map(InsnId)
    }

    /// Instruction after this one in program order
    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        let next = id.0 + 1;
        if next < self.instructions.len() {
            Some(InsnId(next))
        } else {
            None
        }
    }

    /// Ids of all instructions, in program order
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = InsnId> + ExactSizeIterator {
        (0..self.instructions.len()).map(InsnId)
    }

    /// All instructions with their ids, in program order
    pub fn iter(&self) -> impl Iterator<Item = (InsnId, &Instruction<'g>)> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(idx, insn)| (InsnId(idx), insn))
    }

    /// First instruction with the given opcode
    pub fn find(&self, opcode: OpCode) -> Option<InsnId> {
        self.iter()
            .find(|(_, insn)| insn.opcode == opcode)
            .map(|(id, _)| id)
    }
}

impl<'g> Index<InsnId> for MethodBody<'g> {
    type Output = Instruction<'g>;

    fn index(&self, id: InsnId) -> &Instruction<'g> {
        &self.instructions[id.0]
    }
}
