use crate::cil::{
    Error, ExceptionRegion, HandlerKind, InsnId, Instruction, MethodBody, OpCode, Operand,
};
use std::collections::HashMap;
use std::fmt;

/// Opaque label
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct Label(usize);

impl Label {
    /// Get the next fresh label
    pub fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Labels of an exception region, resolved when the body is finished
#[derive(Copy, Clone, Debug)]
pub struct RegionLabels {
    pub try_start: Label,
    pub try_end: Label,
    pub kind: HandlerKind,
    pub filter_start: Option<Label>,
    pub handler_start: Label,
    pub handler_end: Label,
}

enum PendingOperand<'g> {
    Ready(Operand<'g>),
    Label(Label),
    Labels(Vec<Label>),
}

/// Builds a method body from top to bottom
///
/// Branches refer to labels, which may be placed before or after the branch. A label refers to
/// the next instruction pushed after it is placed. A label placed after the last instruction
/// refers to the end of the body: exception regions may end there, but branches may not target
/// it.
pub struct MethodBodyBuilder<'g> {
    name: String,
    returns_value: bool,

    /// Next fresh label
    next_label: Label,

    instructions: Vec<(OpCode, PendingOperand<'g>)>,

    /// Index of the instruction each placed label refers to
    placed_labels: HashMap<Label, usize>,

    regions: Vec<RegionLabels>,
}

impl<'g> MethodBodyBuilder<'g> {
    pub fn new(name: impl Into<String>, returns_value: bool) -> Self {
        MethodBodyBuilder {
            name: name.into(),
            returns_value,
            next_label: Label(0),
            instructions: vec![],
            placed_labels: HashMap::new(),
            regions: vec![],
        }
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> Label {
        let to_return = self.next_label;
        self.next_label = self.next_label.next();
        to_return
    }

    /// Make the label refer to the next instruction pushed
    pub fn place_label(&mut self, label: Label) -> Result<(), Error> {
        if self
            .placed_labels
            .insert(label, self.instructions.len())
            .is_some()
        {
            return Err(Error::DuplicateLabel(label));
        }
        Ok(())
    }

    /// Push an instruction whose operand doesn't refer to labels
    pub fn push(&mut self, opcode: OpCode, operand: Operand<'g>) -> InsnId {
        self.push_pending(opcode, PendingOperand::Ready(operand))
    }

    /// Push an instruction without an operand
    pub fn push_simple(&mut self, opcode: OpCode) -> InsnId {
        self.push(opcode, Operand::None)
    }

    /// Push a branch (or `leave`) to a label
    pub fn push_branch(&mut self, opcode: OpCode, target: Label) -> InsnId {
        self.push_pending(opcode, PendingOperand::Label(target))
    }

    /// Push a `switch` over a jump table
    pub fn push_switch(&mut self, targets: Vec<Label>) -> InsnId {
        self.push_pending(OpCode::Switch, PendingOperand::Labels(targets))
    }

    /// Register an exception region
    pub fn add_region(&mut self, region: RegionLabels) {
        self.regions.push(region);
    }

    fn push_pending(&mut self, opcode: OpCode, operand: PendingOperand<'g>) -> InsnId {
        let id = InsnId(self.instructions.len());
        self.instructions.push((opcode, operand));
        id
    }

    /// Resolve a label to an instruction (`None` for the end of the body)
    fn resolve(&self, label: Label) -> Result<Option<InsnId>, Error> {
        match self.placed_labels.get(&label) {
            None => Err(Error::UnplacedLabel(label)),
            Some(idx) if *idx == self.instructions.len() => Ok(None),
            Some(idx) => Ok(Some(InsnId(*idx))),
        }
    }

    fn resolve_target(&self, instruction: InsnId, label: Label) -> Result<InsnId, Error> {
        self.resolve(label)?
            .ok_or(Error::BranchToEnd { instruction, label })
    }

    fn resolve_start(&self, label: Label) -> Result<InsnId, Error> {
        self.resolve(label)?.ok_or(Error::RegionStartsAtEnd(label))
    }

    /// Resolve all labels into the finished body
    pub fn finish(self) -> Result<MethodBody<'g>, Error> {
        let mut instructions = Vec::with_capacity(self.instructions.len());
        for (idx, (opcode, operand)) in self.instructions.iter().enumerate() {
            let id = InsnId(idx);
            let operand = match operand {
                PendingOperand::Ready(operand) => operand.clone(),
                PendingOperand::Label(label) => Operand::Target(self.resolve_target(id, *label)?),
                PendingOperand::Labels(labels) => Operand::Targets(
                    labels
                        .iter()
                        .map(|label| self.resolve_target(id, *label))
                        .collect::<Result<Vec<InsnId>, Error>>()?,
                ),
            };
            instructions.push(Instruction::new(*opcode, operand));
        }

        let mut exception_regions = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            exception_regions.push(ExceptionRegion {
                try_start: self.resolve_start(region.try_start)?,
                try_end: self.resolve(region.try_end)?,
                kind: region.kind,
                filter_start: match region.filter_start {
                    Some(label) => Some(self.resolve_start(label)?),
                    None => None,
                },
                handler_start: self.resolve_start(region.handler_start)?,
                handler_end: self.resolve(region.handler_end)?,
            });
        }

        MethodBody::new(
            self.name,
            self.returns_value,
            instructions,
            exception_regions,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forward_and_backward_labels() {
        let mut builder = MethodBodyBuilder::new("Test::Loop", false);
        let head = builder.fresh_label();
        let exit = builder.fresh_label();

        builder.place_label(head).unwrap();
        builder.push(OpCode::LdcI4, Operand::Int(1));
        builder.push_branch(OpCode::BrFalse, exit);
        builder.push_branch(OpCode::Br, head);
        builder.place_label(exit).unwrap();
        builder.push_simple(OpCode::Ret);

        let body = builder.finish().unwrap();
        assert_eq!(body[InsnId(1)].operand, Operand::Target(InsnId(3)));
        assert_eq!(body[InsnId(2)].operand, Operand::Target(InsnId(0)));
    }

    #[test]
    fn region_may_end_at_the_end_of_the_body() {
        let mut builder = MethodBodyBuilder::new("Test::Region", false);
        let labels: Vec<Label> = (0..4).map(|_| builder.fresh_label()).collect();

        builder.place_label(labels[0]).unwrap();
        builder.push_branch(OpCode::Leave, labels[2]);
        builder.place_label(labels[1]).unwrap();
        builder.push_simple(OpCode::EndFinally);
        builder.place_label(labels[2]).unwrap();
        builder.push_simple(OpCode::Ret);
        builder.place_label(labels[3]).unwrap();
        builder.add_region(RegionLabels {
            try_start: labels[0],
            try_end: labels[1],
            kind: HandlerKind::Finally,
            filter_start: None,
            handler_start: labels[1],
            handler_end: labels[3],
        });

        let body = builder.finish().unwrap();
        let region = &body.exception_regions()[0];
        assert_eq!(region.try_end, Some(InsnId(1)));
        assert_eq!(region.handler_end, None);
    }

    #[test]
    fn label_errors() {
        let mut builder = MethodBodyBuilder::new("Test::Unplaced", false);
        let nowhere = builder.fresh_label();
        builder.push_branch(OpCode::Br, nowhere);
        assert_eq!(builder.finish().err(), Some(Error::UnplacedLabel(nowhere)));

        let mut builder = MethodBodyBuilder::new("Test::Duplicate", false);
        let twice = builder.fresh_label();
        builder.place_label(twice).unwrap();
        assert_eq!(builder.place_label(twice), Err(Error::DuplicateLabel(twice)));

        let mut builder = MethodBodyBuilder::new("Test::BranchToEnd", false);
        let end = builder.fresh_label();
        let branch = builder.push_branch(OpCode::Br, end);
        builder.place_label(end).unwrap();
        assert_eq!(
            builder.finish().err(),
            Some(Error::BranchToEnd {
                instruction: branch,
                label: end
            })
        );
    }
}
