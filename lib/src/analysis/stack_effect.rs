use crate::analysis::{Error, MalformedReason};
use crate::cil::{
    CallSignature, FlowControl, InsnId, Instruction, MethodBody, OpCode, Operand, OperandKind,
    PopBehaviour, PushBehaviour,
};

/// Number of values an instruction pops, and then pushes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackEffect {
    pub pop: usize,
    pub push: usize,
}

impl StackEffect {
    pub const fn new(pop: usize, push: usize) -> StackEffect {
        StackEffect { pop, push }
    }

    /// Stack effect of an instruction, independently of the body containing it
    ///
    /// `dup` is modelled as popping nothing and pushing one value. Call-style instructions get
    /// their effect from their signature. Instructions whose effect depends on the stack or on
    /// the enclosing method (`leave`, `ret`) are rejected here: see [`stack_effect_in`].
    pub fn of(instruction: &Instruction<'_>) -> Result<StackEffect, MalformedReason> {
        let info = instruction.opcode.info();

        let has_targets = match info.operand {
            OperandKind::Target => matches!(instruction.operand, Operand::Target(_)),
            OperandKind::Targets => matches!(instruction.operand, Operand::Targets(_)),
            _ => true,
        };
        if !has_targets {
            return Err(MalformedReason::MissingBranchTarget);
        }

        if instruction.opcode == OpCode::Dup {
            return Ok(StackEffect::new(0, 1));
        }

        if let Some(signature) = call_signature(instruction)? {
            return Ok(call_effect(instruction.opcode, signature));
        }

        let pop = match info.pop {
            PopBehaviour::Pop0 => 0,
            PopBehaviour::Pop1 => 1,
            PopBehaviour::Pop2 => 2,
            PopBehaviour::Pop3 => 3,
            PopBehaviour::VarPop => return Err(MalformedReason::VariablePop),
            PopBehaviour::PopAll => return Err(MalformedReason::StackClearing),
        };
        let push = match info.push {
            PushBehaviour::Push0 => 0,
            PushBehaviour::Push1 => 1,
            PushBehaviour::Push2 => 2,
            PushBehaviour::VarPush => return Err(MalformedReason::MissingCallSignature),
        };
        Ok(StackEffect::new(pop, push))
    }

    /// Net change in stack depth
    pub fn net(self) -> isize {
        self.push as isize - self.pop as isize
    }
}

/// Signature of an instruction whose effect depends on one
///
/// Returns `None` for every other instruction (including `jmp` and `ldftn`, which reference a
/// method without calling it on the stack).
fn call_signature<'a>(
    instruction: &'a Instruction<'_>,
) -> Result<Option<&'a CallSignature>, MalformedReason> {
    let info = instruction.opcode.info();
    let signature_dependent =
        matches!(info.pop, PopBehaviour::VarPop) && info.flow_control == FlowControl::Call;
    if !signature_dependent {
        return Ok(None);
    }
    match (&instruction.operand, info.operand) {
        (Operand::Method(method), OperandKind::Method) => Ok(Some(&method.0.signature)),
        (Operand::Signature(signature), OperandKind::Signature) => Ok(Some(signature.0)),
        _ => Err(MalformedReason::MissingCallSignature),
    }
}

fn call_effect(opcode: OpCode, signature: &CallSignature) -> StackEffect {
    let is_constructor = opcode == OpCode::NewObj;
    let is_indirect = opcode == OpCode::CallI;

    let mut pop = signature.parameter_count;
    if signature.has_implicit_receiver() && !is_constructor {
        pop += 1;
    }
    if is_indirect {
        pop += 1;
    }
    let push = if signature.returns_value || is_constructor {
        1
    } else {
        0
    };
    StackEffect::new(pop, push)
}

/// Stack effect of an instruction of a body
///
/// Unlike [`StackEffect::of`], this resolves the effect of `ret` from the return type of the
/// body. `leave` is still rejected, since its effect depends on the stack depth.
pub fn stack_effect_in(body: &MethodBody<'_>, id: InsnId) -> Result<StackEffect, Error> {
    effect_in_body(body, id).map_err(|reason| Error::MalformedInstruction {
        instruction: id,
        reason,
    })
}

pub(crate) fn effect_in_body(
    body: &MethodBody<'_>,
    id: InsnId,
) -> Result<StackEffect, MalformedReason> {
    let instruction = &body[id];
    if instruction.opcode == OpCode::Ret {
        return Ok(StackEffect::new(usize::from(body.returns_value), 0));
    }
    StackEffect::of(instruction)
}

/// Number of values a call-style instruction consumes and produces
pub fn compute_arity(body: &MethodBody<'_>, call: InsnId) -> Result<StackEffect, Error> {
    if body[call].flow_control() != FlowControl::Call {
        return Err(Error::NotACallInstruction(call));
    }
    stack_effect_in(body, call)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cil::{
        CallingConvention, Metadata, MetadataArenas, MethodData, MethodId, OpCode, OperandKind,
    };

    fn body<'g>(returns_value: bool, instructions: Vec<Instruction<'g>>) -> MethodBody<'g> {
        MethodBody::new("Test::Effects", returns_value, instructions, vec![]).unwrap()
    }

    fn declare<'g>(
        metadata: &'g Metadata<'g>,
        name: &str,
        parameter_count: usize,
        calling_convention: CallingConvention,
        returns_value: bool,
    ) -> MethodId<'g> {
        metadata
            .add_method(MethodData {
                name: name.to_owned(),
                signature: CallSignature {
                    parameter_count,
                    calling_convention,
                    returns_value,
                },
            })
            .unwrap()
    }

    #[test]
    fn table_effects() {
        let effect = |opcode| StackEffect::of(&Instruction::simple(opcode)).unwrap();
        assert_eq!(effect(OpCode::Nop), StackEffect::new(0, 0));
        assert_eq!(effect(OpCode::Add), StackEffect::new(2, 1));
        assert_eq!(effect(OpCode::StElemRef), StackEffect::new(3, 0));
        assert_eq!(effect(OpCode::Pop), StackEffect::new(1, 0));
        assert_eq!(effect(OpCode::Throw), StackEffect::new(1, 0));
    }

    #[test]
    fn dup_is_special_cased() {
        let dup = StackEffect::of(&Instruction::simple(OpCode::Dup)).unwrap();
        assert_eq!(dup, StackEffect::new(0, 1));
        assert_eq!(dup.net(), 1);
    }

    #[test]
    fn call_effects() {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);
        let instance = CallingConvention::HAS_THIS;
        let explicit = CallingConvention::HAS_THIS | CallingConvention::EXPLICIT_THIS;

        let max = declare(&metadata, "Math::Max", 2, CallingConvention::empty(), true);
        let log = declare(&metadata, "Logger::Log", 1, instance, false);
        let invoke = declare(&metadata, "Thunk::Invoke", 3, explicit, false);
        let ctor = declare(&metadata, "Point::.ctor", 2, instance, false);
        let target = metadata
            .add_signature(String::from("Unary"), CallSignature::new_static(1, true))
            .unwrap();

        let effect = |opcode, operand| StackEffect::of(&Instruction::new(opcode, operand));
        assert_eq!(effect(OpCode::Call, Operand::Method(max)), Ok(StackEffect::new(2, 1)));
        assert_eq!(effect(OpCode::CallVirt, Operand::Method(log)), Ok(StackEffect::new(2, 0)));
        assert_eq!(effect(OpCode::Call, Operand::Method(invoke)), Ok(StackEffect::new(3, 0)));
        assert_eq!(effect(OpCode::NewObj, Operand::Method(ctor)), Ok(StackEffect::new(2, 1)));
        assert_eq!(effect(OpCode::CallI, Operand::Signature(target)), Ok(StackEffect::new(2, 1)));

        // Referencing a method doesn't make an instruction a call
        assert_eq!(effect(OpCode::LdFtn, Operand::Method(max)), Ok(StackEffect::new(0, 1)));
        assert_eq!(effect(OpCode::Jmp, Operand::Method(max)), Ok(StackEffect::new(0, 0)));

        assert_eq!(
            effect(OpCode::Call, Operand::None),
            Err(MalformedReason::MissingCallSignature)
        );
        assert_eq!(
            effect(OpCode::CallI, Operand::Method(max)),
            Err(MalformedReason::MissingCallSignature)
        );
    }

    #[test]
    fn context_dependent_effects() {
        assert_eq!(
            StackEffect::of(&Instruction::simple(OpCode::Ret)),
            Err(MalformedReason::VariablePop)
        );
        assert_eq!(
            StackEffect::of(&Instruction::new(OpCode::Leave, Operand::Target(InsnId(0)))),
            Err(MalformedReason::StackClearing)
        );

        let returning = body(true, vec![Instruction::simple(OpCode::Ret)]);
        assert_eq!(stack_effect_in(&returning, InsnId(0)), Ok(StackEffect::new(1, 0)));
        let void = body(false, vec![Instruction::simple(OpCode::Ret)]);
        assert_eq!(stack_effect_in(&void, InsnId(0)), Ok(StackEffect::new(0, 0)));
    }

    #[test]
    fn branch_without_target_is_malformed() {
        let body = body(false, vec![Instruction::simple(OpCode::BrTrue)]);
        assert_eq!(
            stack_effect_in(&body, InsnId(0)),
            Err(Error::MalformedInstruction {
                instruction: InsnId(0),
                reason: MalformedReason::MissingBranchTarget,
            })
        );
    }

    #[test]
    fn arity_requires_a_call() {
        let body = body(false, vec![Instruction::simple(OpCode::Add)]);
        assert_eq!(
            compute_arity(&body, InsnId(0)),
            Err(Error::NotACallInstruction(InsnId(0)))
        );
    }

    #[test]
    fn effects_stay_small() {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);
        let method = metadata
            .add_method(MethodData {
                name: String::from("Any::Method"),
                signature: CallSignature::new_instance(2, true),
            })
            .unwrap();
        let signature = metadata
            .add_signature(String::from("Any"), CallSignature::new_static(0, true))
            .unwrap();

        for opcode in OpCode::ALL {
            let operand = match opcode.info().operand {
                OperandKind::None => Operand::None,
                OperandKind::Int => Operand::Int(0),
                OperandKind::Float => Operand::Float(0.0),
                OperandKind::String => Operand::String(String::new()),
                OperandKind::Variable => Operand::Variable(0),
                OperandKind::Target => Operand::Target(InsnId(0)),
                OperandKind::Targets => Operand::Targets(vec![InsnId(0)]),
                OperandKind::Method => Operand::Method(method),
                OperandKind::Signature => Operand::Signature(signature),
                OperandKind::Token => Operand::Token(String::from("T")),
            };
            match StackEffect::of(&Instruction::new(*opcode, operand)) {
                Ok(effect) => assert!(effect.push <= 2, "{} pushes {}", opcode, effect.push),
                Err(reason) => assert!(
                    matches!(opcode, OpCode::Ret | OpCode::Leave),
                    "{} is {}",
                    opcode,
                    reason
                ),
            }
        }
    }
}
