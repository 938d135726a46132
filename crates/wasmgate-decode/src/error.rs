//! Decoder errors, each tagged with the byte offset at which the problem
//! was detected, distinguishing syntactic failures (malformed LEB128, bad
//! UTF-8) from structural ones (unknown section ids, out-of-order sections)
//! as far as the decoder can tell them apart from bytes alone.

extern crate alloc;
use alloc::string::String;

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    #[error("unexpected end of input at offset {offset:#x}")]
    UnexpectedEof { offset: usize },
    #[error("invalid magic number")]
    InvalidMagicNumber,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("malformed UTF-8 string at offset {offset:#x}")]
    InvalidUtf8 { offset: usize },
    #[error("overlong LEB128 encoding at offset {offset:#x}")]
    OverlongLeb128 { offset: usize },
    #[error("LEB128 value out of range at offset {offset:#x}")]
    Leb128OutOfRange { offset: usize },
    #[error("unknown section id {id} at offset {offset:#x}")]
    UnknownSectionId { id: u8, offset: usize },
    #[error("sections out of order at offset {offset:#x}")]
    SectionOutOfOrder { offset: usize },
    #[error("unknown value type {tag:#x} at offset {offset:#x}")]
    UnknownValueType { tag: u8, offset: usize },
    #[error("unknown element type {tag:#x} at offset {offset:#x}")]
    UnknownElementType { tag: u8, offset: usize },
    #[error("unknown import/export kind {tag:#x} at offset {offset:#x}")]
    UnknownExternalKind { tag: u8, offset: usize },
    #[error("unknown global mutability {tag:#x} at offset {offset:#x}")]
    UnknownMutability { tag: u8, offset: usize },
    #[error("unknown limits flag {tag:#x} at offset {offset:#x}")]
    UnknownLimitsFlag { tag: u8, offset: usize },
    #[error("unknown opcode {opcode:#04x} at offset {offset:#x}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("result arity greater than one at offset {offset:#x}")]
    MultiValueResult { offset: usize },
    #[error("string of {len} bytes exceeds the {max} byte limit at offset {offset:#x}")]
    StringTooLong { len: usize, max: usize, offset: usize },
    #[error("vector of {len} entries exceeds the {max} entry limit at offset {offset:#x}")]
    VectorTooLong { len: usize, max: usize, offset: usize },
    #[error("function and code section disagree on function count ({functions} vs {codes})")]
    FunctionCodeCountMismatch { functions: usize, codes: usize },
    #[error("module declares more than one start section")]
    MultipleStartSections,
    #[error("trailing bytes after the last section at offset {offset:#x}")]
    TrailingBytes { offset: usize },
    #[error("custom section {name:?} was truncated")]
    TruncatedCustomSection { name: String },
}

pub type Result<T> = core::result::Result<T, Error>;
