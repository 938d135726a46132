//! The module intermediate representation: index spaces, the operator
//! table, and the `Module` structure every pipeline stage shares.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod indices;
pub mod module;
pub mod ops;

pub use indices::*;
pub use module::*;
pub use ops::{BrTable, Instruction, MemArg, Signature};
