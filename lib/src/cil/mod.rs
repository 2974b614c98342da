//! Method bodies of CIL-style stack bytecode
//!
//! Bodies are built either programmatically, with [`MethodBodyBuilder`], or from a textual
//! listing, with [`parse_listing`]. Callees referenced by call-style instructions live in a
//! [`Metadata`] that outlives every body referring to it.

mod body;
mod builder;
mod errors;
mod instruction;
mod listing;
mod metadata;
mod opcodes;

pub use body::*;
pub use builder::*;
pub use errors::*;
pub use instruction::*;
pub use listing::*;
pub use metadata::*;
pub use opcodes::*;
