//! Validator errors, split into the module pass's structural tier and the
//! body pass's typing tier. Structural errors name the offending index
//! space entry; typing errors additionally carry the byte offset within the
//! failing function's operator stream, matching the decoder's convention of
//! always pointing at the exact byte a problem was detected at.

extern crate alloc;

/// Which index space a [`Error::BadIndex`] refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IndexKind {
    Type,
    Func,
    Table,
    Memory,
    Global,
    Local,
    Label,
    Element,
    Data,
}

impl core::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            IndexKind::Type => "type",
            IndexKind::Func => "func",
            IndexKind::Table => "table",
            IndexKind::Memory => "memory",
            IndexKind::Global => "global",
            IndexKind::Local => "local",
            IndexKind::Label => "label",
            IndexKind::Element => "elem",
            IndexKind::Data => "data",
        };
        f.write_str(name)
    }
}

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    // --- Module pass (structural) ---
    #[error("{kind} index {index} out of range")]
    BadIndex { kind: IndexKind, index: u32 },
    #[error("module declares more than one memory")]
    TooManyMemories,
    #[error("module declares more than one table")]
    TooManyTables,
    #[error("duplicate export name {name:?}")]
    DuplicateExportName { name: alloc::string::String },
    #[error("start function must have type () -> ()")]
    StartFunctionNotNullary,
    #[error("mutable globals cannot be imported unless explicitly enabled")]
    MutableGlobalImported,
    #[error("initializer expression is not a constant or an imported-immutable-global reference")]
    BadConstExpr,
    #[error("initializer expression type mismatch: expected {expected}, found {actual}")]
    ConstExprTypeMismatch {
        expected: wasmgate_types::ValueType,
        actual: wasmgate_types::ValueType,
    },
    #[error("data segment at index {segment} falls outside memory {mem}'s declared minimum")]
    DataSegmentOutOfRange { segment: u32, mem: u32 },
    #[error("element segment at index {segment} falls outside table {table}'s declared minimum")]
    ElementSegmentOutOfRange { segment: u32, table: u32 },
    #[error("data segments {a} and {b} have overlapping constant-base ranges")]
    OverlappingDataSegments { a: u32, b: u32 },
    #[error("element segments {a} and {b} have overlapping constant-base ranges")]
    OverlappingElementSegments { a: u32, b: u32 },

    // --- Body pass (typing) ---
    #[error("function {func}: stack underflow at offset {offset:#x}")]
    StackUnderflow { func: u32, offset: usize },
    #[error("function {func}: type mismatch at offset {offset:#x}: expected {expected}, found {actual}")]
    TypeMismatch {
        func: u32,
        offset: usize,
        expected: wasmgate_types::ValueType,
        actual: wasmgate_types::ValueType,
    },
    #[error("function {func}: {kind} index {index} out of range at offset {offset:#x}")]
    BadBodyIndex { func: u32, offset: usize, kind: IndexKind, index: u32 },
    #[error("function {func}: alignment exceeds natural alignment at offset {offset:#x}")]
    AlignmentTooLarge { func: u32, offset: usize },
    #[error("function {func}: branch target type mismatch at offset {offset:#x}")]
    BranchTargetMismatch { func: u32, offset: usize },
    #[error("function {func}: stack was not empty at end of control structure at offset {offset:#x}")]
    StackNotEmpty { func: u32, offset: usize },
    #[error("function {func}: else without a matching if at offset {offset:#x}")]
    ElseWithoutIf { func: u32, offset: usize },
    #[error("function {func}: `if` without `else` must have an empty result type at offset {offset:#x}")]
    IfWithoutElse { func: u32, offset: usize },
    #[error("function {func}: memory access requires a declared memory at offset {offset:#x}")]
    NoMemory { func: u32, offset: usize },
    #[error("function {func}: call_indirect requires a declared table at offset {offset:#x}")]
    NoTable { func: u32, offset: usize },
    #[error("function {func}: setting an immutable global at offset {offset:#x}")]
    GlobalNotMutable { func: u32, offset: usize },
    #[error("function {func}: ran out of bytes before its control stack emptied")]
    UnterminatedFunction { func: u32 },
    #[error("function {func}: trailing bytes after the final end at offset {offset:#x}")]
    TrailingBytes { func: u32, offset: usize },
    #[error("function {func}: malformed operator stream at offset {offset:#x}: {source}")]
    Decode {
        func: u32,
        offset: usize,
        source: wasmgate_decode::Error,
    },
}

pub type Result<T> = core::result::Result<T, Error>;
