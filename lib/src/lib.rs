//! Stack-effect analysis for CIL-style stack bytecode
//!
//! The crate is split into two layers:
//!
//!   - [`cil`] models method bodies: opcodes with their static stack behaviour, instructions
//!     addressed by [`cil::InsnId`], exception regions, and the call signatures referenced by
//!     call-style instructions.
//!
//!   - [`analysis`] reasons about those bodies: the stack effect of a single instruction, the
//!     instructions producing each argument of a call, the basic block partition of a body, and
//!     a single-pass verifier checking that the stack depth is consistent at every join point.
//!
//! ### Example
//!
//! ```
//! use stackweave::analysis::{locate_arguments, verify};
//! use stackweave::cil::{parse_listing, Metadata, MetadataArenas};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let arenas = MetadataArenas::new();
//! let metadata = Metadata::new(&arenas);
//! let listing = parse_listing(
//!     &metadata,
//!     r#"
//!     .signature Math::Max params=2 returns
//!     .method Sample::Run
//!         ldc.i4 1
//!         ldc.i4 2
//!         call Math::Max
//!         pop
//!         ret
//!     .end
//!     "#,
//! )?;
//!
//! let body = &listing.methods[0];
//! let call = body.find(stackweave::cil::OpCode::Call).unwrap();
//! let arguments = locate_arguments(body, call)?;
//! assert_eq!(arguments.len(), 2);
//!
//! let stack_map = verify(body)?;
//! assert_eq!(stack_map.max_stack, 2);
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

pub mod analysis;
pub mod cil;
mod util;
