use crate::cil::Error;
use crate::util::RefId;
use bitflags::bitflags;
use elsa::map::FrozenMap;
use std::fmt;
use typed_arena::Arena;

bitflags! {
    /// Calling convention bits of a method signature
    ///
    /// Only the bits that change how many values a call consumes are tracked.
    pub struct CallingConvention: u8 {
        /// The callee takes a receiver (`this`)
        const HAS_THIS = 0x20;

        /// The receiver is listed among the declared parameters
        const EXPLICIT_THIS = 0x40;
    }
}

/// Shape of a callee, as far as the evaluation stack is concerned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSignature {
    /// Number of declared parameters
    pub parameter_count: usize,

    pub calling_convention: CallingConvention,

    /// Is the declared return type something other than `void`?
    pub returns_value: bool,
}

impl CallSignature {
    pub fn new_static(parameter_count: usize, returns_value: bool) -> CallSignature {
        CallSignature {
            parameter_count,
            calling_convention: CallingConvention::empty(),
            returns_value,
        }
    }

    pub fn new_instance(parameter_count: usize, returns_value: bool) -> CallSignature {
        CallSignature {
            parameter_count,
            calling_convention: CallingConvention::HAS_THIS,
            returns_value,
        }
    }

    /// Does a call consume a receiver on top of the declared parameters?
    pub fn has_implicit_receiver(&self) -> bool {
        self.calling_convention.contains(CallingConvention::HAS_THIS)
            && !self
                .calling_convention
                .contains(CallingConvention::EXPLICIT_THIS)
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.calling_convention.contains(CallingConvention::HAS_THIS) {
            f.write_str("instance ")?;
        }
        if self
            .calling_convention
            .contains(CallingConvention::EXPLICIT_THIS)
        {
            f.write_str("explicit ")?;
        }
        let return_type = if self.returns_value { "value" } else { "void" };
        write!(f, "{}({})", return_type, self.parameter_count)
    }
}

/// A callee that can be referenced from `call`, `callvirt`, `newobj`, `jmp` and `ldftn`
#[derive(Debug, PartialEq, Eq)]
pub struct MethodData {
    /// Fully qualified name (eg. `System.Math::Max`)
    pub name: String,

    pub signature: CallSignature,
}

pub type MethodId<'g> = RefId<'g, MethodData>;

/// Standalone signature referenced from `calli`
pub type SignatureId<'g> = RefId<'g, CallSignature>;

pub struct MetadataArenas {
    method_arena: Arena<MethodData>,
    signature_arena: Arena<CallSignature>,
}

impl MetadataArenas {
    pub fn new() -> Self {
        MetadataArenas {
            method_arena: Arena::new(),
            signature_arena: Arena::new(),
        }
    }
}

impl Default for MetadataArenas {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved callees and signatures shared by all method bodies of a module
///
/// Entries are allocated once and never move, so instructions can hold plain references to them
/// for as long as the arenas live.
pub struct Metadata<'g> {
    arenas: &'g MetadataArenas,
    methods: FrozenMap<String, MethodId<'g>>,
    signatures: FrozenMap<String, SignatureId<'g>>,
}

impl<'g> Metadata<'g> {
    /// New empty metadata
    pub fn new(arenas: &'g MetadataArenas) -> Self {
        Metadata {
            arenas,
            methods: FrozenMap::new(),
            signatures: FrozenMap::new(),
        }
    }

    /// Add a callee
    ///
    /// Re-declaring a callee with an identical signature returns the existing entry.
    pub fn add_method(&'g self, method: MethodData) -> Result<MethodId<'g>, Error> {
        if let Some(existing) = self.methods.get(method.name.as_str()) {
            return if existing.signature == method.signature {
                Ok(RefId(existing))
            } else {
                Err(Error::ConflictingDeclaration(method.name))
            };
        }
        let data: &'g MethodData = self.arenas.method_arena.alloc(method);
        self.methods.insert(data.name.clone(), RefId(data));
        Ok(RefId(data))
    }

    /// Add a standalone signature under a name
    pub fn add_signature(
        &'g self,
        name: String,
        signature: CallSignature,
    ) -> Result<SignatureId<'g>, Error> {
        if let Some(existing) = self.signatures.get(name.as_str()) {
            return if *existing == signature {
                Ok(RefId(existing))
            } else {
                Err(Error::ConflictingDeclaration(name))
            };
        }
        let data: &'g CallSignature = self.arenas.signature_arena.alloc(signature);
        self.signatures.insert(name, RefId(data));
        Ok(RefId(data))
    }

    pub fn lookup_method(&'g self, name: &str) -> Option<MethodId<'g>> {
        self.methods.get(name).map(RefId)
    }

    pub fn lookup_signature(&'g self, name: &str) -> Option<SignatureId<'g>> {
        self.signatures.get(name).map(RefId)
    }
}
