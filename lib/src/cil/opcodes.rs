use std::fmt;

/// How control leaves an instruction
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FlowControl {
    /// Falls through to the next instruction
    Next,

    /// Unconditional transfer to the instruction operand (`br`, `leave`)
    Branch,

    /// Either falls through or transfers to one of the instruction operands (`brtrue`, `switch`)
    CondBranch,

    /// Calls into another method and (usually) comes back
    Call,

    /// Leaves the method or the current handler (`ret`, `endfinally`, `endfilter`)
    Return,

    /// Raises an exception (`throw`, `rethrow`)
    Throw,
}

impl FlowControl {
    /// Does this end a basic block?
    pub fn ends_block(self) -> bool {
        matches!(
            self,
            FlowControl::Branch | FlowControl::CondBranch | FlowControl::Return | FlowControl::Throw
        )
    }

    /// Is the instruction following this one unreachable by fallthrough?
    pub fn is_unconditional_transfer(self) -> bool {
        matches!(
            self,
            FlowControl::Branch | FlowControl::Return | FlowControl::Throw
        )
    }
}

/// Number of values an opcode pops, as far as the opcode alone can tell
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PopBehaviour {
    Pop0,
    Pop1,
    Pop2,
    Pop3,

    /// Depends on the operand (call signatures) or on the enclosing method (`ret`)
    VarPop,

    /// Empties the evaluation stack, whatever its depth (`leave`)
    PopAll,
}

/// Number of values an opcode pushes, as far as the opcode alone can tell
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PushBehaviour {
    Push0,
    Push1,
    Push2,

    /// Depends on the call signature
    VarPush,
}

/// Shape of the operand an opcode expects
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OperandKind {
    None,
    Int,
    Float,
    String,
    Variable,
    Target,
    Targets,
    Method,
    Signature,
    Token,
}

/// Static metadata of an opcode
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct OpCodeInfo {
    /// Mnemonic used in listings
    pub name: &'static str,
    pub flow_control: FlowControl,
    pub pop: PopBehaviour,
    pub push: PushBehaviour,
    pub operand: OperandKind,
}

macro_rules! opcodes {
    ($($variant:ident => ($name:literal, $flow:ident, $pop:ident, $push:ident, $operand:ident),)*) => {
        /// Opcodes understood by the analyses
        ///
        /// Short and long branch forms (`br.s` vs. `br`) and the numbered load/store shorthands
        /// (`ldloc.0`) are folded into a single opcode with an operand, since they have identical
        /// stack behaviour.
        #[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
        pub enum OpCode {
            $($variant,)*
        }

        impl OpCode {
            /// Every opcode, in declaration order
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant,)*];

            pub fn info(self) -> OpCodeInfo {
                match self {
                    $(OpCode::$variant => OpCodeInfo {
                        name: $name,
                        flow_control: FlowControl::$flow,
                        pop: PopBehaviour::$pop,
                        push: PushBehaviour::$push,
                        operand: OperandKind::$operand,
                    },)*
                }
            }
        }
    };
}

opcodes! {
    Nop => ("nop", Next, Pop0, Push0, None),
    LdArg => ("ldarg", Next, Pop0, Push1, Variable),
    LdArgA => ("ldarga", Next, Pop0, Push1, Variable),
    StArg => ("starg", Next, Pop1, Push0, Variable),
    LdLoc => ("ldloc", Next, Pop0, Push1, Variable),
    LdLocA => ("ldloca", Next, Pop0, Push1, Variable),
    StLoc => ("stloc", Next, Pop1, Push0, Variable),
    LdNull => ("ldnull", Next, Pop0, Push1, None),
    LdcI4 => ("ldc.i4", Next, Pop0, Push1, Int),
    LdcI8 => ("ldc.i8", Next, Pop0, Push1, Int),
    LdcR4 => ("ldc.r4", Next, Pop0, Push1, Float),
    LdcR8 => ("ldc.r8", Next, Pop0, Push1, Float),
    LdStr => ("ldstr", Next, Pop0, Push1, String),
    Dup => ("dup", Next, Pop1, Push2, None),
    Pop => ("pop", Next, Pop1, Push0, None),
    Jmp => ("jmp", Call, Pop0, Push0, Method),
    Call => ("call", Call, VarPop, VarPush, Method),
    CallI => ("calli", Call, VarPop, VarPush, Signature),
    CallVirt => ("callvirt", Call, VarPop, VarPush, Method),
    NewObj => ("newobj", Call, VarPop, Push1, Method),
    Ret => ("ret", Return, VarPop, Push0, None),
    Br => ("br", Branch, Pop0, Push0, Target),
    BrFalse => ("brfalse", CondBranch, Pop1, Push0, Target),
    BrTrue => ("brtrue", CondBranch, Pop1, Push0, Target),
    Beq => ("beq", CondBranch, Pop2, Push0, Target),
    Bge => ("bge", CondBranch, Pop2, Push0, Target),
    Bgt => ("bgt", CondBranch, Pop2, Push0, Target),
    Ble => ("ble", CondBranch, Pop2, Push0, Target),
    Blt => ("blt", CondBranch, Pop2, Push0, Target),
    BneUn => ("bne.un", CondBranch, Pop2, Push0, Target),
    Switch => ("switch", CondBranch, Pop1, Push0, Targets),
    LdIndI4 => ("ldind.i4", Next, Pop1, Push1, None),
    LdIndRef => ("ldind.ref", Next, Pop1, Push1, None),
    StIndI4 => ("stind.i4", Next, Pop2, Push0, None),
    StIndRef => ("stind.ref", Next, Pop2, Push0, None),
    Add => ("add", Next, Pop2, Push1, None),
    Sub => ("sub", Next, Pop2, Push1, None),
    Mul => ("mul", Next, Pop2, Push1, None),
    Div => ("div", Next, Pop2, Push1, None),
    Rem => ("rem", Next, Pop2, Push1, None),
    And => ("and", Next, Pop2, Push1, None),
    Or => ("or", Next, Pop2, Push1, None),
    Xor => ("xor", Next, Pop2, Push1, None),
    Shl => ("shl", Next, Pop2, Push1, None),
    Shr => ("shr", Next, Pop2, Push1, None),
    Neg => ("neg", Next, Pop1, Push1, None),
    Not => ("not", Next, Pop1, Push1, None),
    ConvI4 => ("conv.i4", Next, Pop1, Push1, None),
    ConvI8 => ("conv.i8", Next, Pop1, Push1, None),
    ConvR8 => ("conv.r8", Next, Pop1, Push1, None),
    Ceq => ("ceq", Next, Pop2, Push1, None),
    Cgt => ("cgt", Next, Pop2, Push1, None),
    Clt => ("clt", Next, Pop2, Push1, None),
    LdObj => ("ldobj", Next, Pop1, Push1, Token),
    CpObj => ("cpobj", Next, Pop2, Push0, Token),
    InitObj => ("initobj", Next, Pop1, Push0, Token),
    CastClass => ("castclass", Next, Pop1, Push1, Token),
    IsInst => ("isinst", Next, Pop1, Push1, Token),
    Box => ("box", Next, Pop1, Push1, Token),
    Unbox => ("unbox", Next, Pop1, Push1, Token),
    UnboxAny => ("unbox.any", Next, Pop1, Push1, Token),
    SizeOf => ("sizeof", Next, Pop0, Push1, Token),
    LdFld => ("ldfld", Next, Pop1, Push1, Token),
    LdFldA => ("ldflda", Next, Pop1, Push1, Token),
    StFld => ("stfld", Next, Pop2, Push0, Token),
    LdSFld => ("ldsfld", Next, Pop0, Push1, Token),
    StSFld => ("stsfld", Next, Pop1, Push0, Token),
    NewArr => ("newarr", Next, Pop1, Push1, Token),
    LdLen => ("ldlen", Next, Pop1, Push1, None),
    LdElem => ("ldelem", Next, Pop2, Push1, Token),
    LdElemRef => ("ldelem.ref", Next, Pop2, Push1, None),
    StElem => ("stelem", Next, Pop3, Push0, Token),
    StElemRef => ("stelem.ref", Next, Pop3, Push0, None),
    LdToken => ("ldtoken", Next, Pop0, Push1, Token),
    LdFtn => ("ldftn", Next, Pop0, Push1, Method),
    LdVirtFtn => ("ldvirtftn", Next, Pop1, Push1, Method),
    CpBlk => ("cpblk", Next, Pop3, Push0, None),
    InitBlk => ("initblk", Next, Pop3, Push0, None),
    LocAlloc => ("localloc", Next, Pop1, Push1, None),
    Throw => ("throw", Throw, Pop1, Push0, None),
    Rethrow => ("rethrow", Throw, Pop0, Push0, None),
    Leave => ("leave", Branch, PopAll, Push0, Target),
    EndFinally => ("endfinally", Return, Pop0, Push0, None),
    EndFilter => ("endfilter", Return, Pop1, Push0, None),
}

impl OpCode {
    /// Look up an opcode by its mnemonic
    pub fn from_name(name: &str) -> Option<OpCode> {
        OpCode::ALL
            .iter()
            .copied()
            .find(|opcode| opcode.info().name == name)
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn flow_control(self) -> FlowControl {
        self.info().flow_control
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
