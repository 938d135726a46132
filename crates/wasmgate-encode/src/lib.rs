//! The binary encoder: serializes a [`wasmgate_ir::Module`] back into the
//! WebAssembly MVP binary format, the bit-exact inverse of
//! `wasmgate_decode` for valid modules.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod instructions;
mod module;
mod writer;

pub use module::encode_module;
pub use writer::ByteWriter;
