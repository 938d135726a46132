//! The binary decoder: deserializes the WebAssembly MVP binary format into a
//! [`wasmgate_ir::Module`].
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod binary_reader;
mod error;
mod instructions;
pub mod limits;
mod module;

pub use binary_reader::BinaryReader;
pub use error::{Error, Result};
pub use module::decode_module;
