//! Stack-effect analyses over method bodies
//!
//! Every analysis borrows a [`crate::cil::MethodBody`] and never modifies it, so analyses of
//! different methods are independent of each other.

mod arguments;
mod basic_block;
mod batch;
mod errors;
mod settings;
mod stack_effect;
mod verifier;

pub use arguments::*;
pub use basic_block::*;
pub use batch::*;
pub use errors::*;
pub use settings::*;
pub use stack_effect::*;
pub use verifier::*;
