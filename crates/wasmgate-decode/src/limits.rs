//! Vector-size caps enforced while decoding, shared with the validator so
//! "too many X" is reported the same way regardless of which pass notices
//! first.

pub const MAX_WASM_STRING_SIZE: usize = 100_000;
pub const MAX_WASM_EXPORTS: usize = 100_000;
pub const MAX_WASM_FUNCTIONS: usize = 1_000_000;
pub const MAX_WASM_GLOBALS: usize = 1_000_000;
pub const MAX_WASM_TYPES: usize = 1_000_000;
pub const MAX_WASM_ELEMENT_SEGMENTS: usize = 100_000;
pub const MAX_WASM_DATA_SEGMENTS: usize = 100_000;

pub const MAX_WASM_FUNCTION_SIZE: usize = 128 * 1024;
pub const MAX_WASM_FUNCTION_LOCALS: usize = 50_000;
pub const MAX_WASM_FUNCTION_PARAMS: usize = 1_000;

pub const MAX_WASM_TABLE_ENTRIES: usize = 10_000_000;
