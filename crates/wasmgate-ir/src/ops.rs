//! The single closed operator table shared by the decoder, encoder,
//! validator, and WAST front end.
//!
//! This is the MVP operator set only (through opcode `0xbf`, f64.reinterpret_i32's
//! successor). Later proposals (SIMD, threads, tail calls, exception handling,
//! reference types, GC) each need a value-stack slot or an index space this
//! crate's data model doesn't have room for, so their opcodes are rejected by
//! the decoder as `UnknownOpcode` rather than silently ignored.

extern crate alloc;

use crate::indices::{FuncIdx, GlobalIdx, LabelIdx, LocalIdx, TableIdx, TypeIdx};
use wasmgate_types::{ResultType, ValueType};

/// The alignment/offset pair attached to every load and store.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemArg {
    /// log2 of the claimed alignment, e.g. `2` for a 4-byte-aligned access.
    pub align: u32,
    pub offset: u32,
}

/// A branch table's targets: zero or more explicit depths plus a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrTable {
    pub targets: alloc::vec::Vec<LabelIdx>,
    pub default: LabelIdx,
}

macro_rules! define_operators {
    ($( $(#[$attr:meta])* $variant:ident $( { $($field:ident : $ty:ty),* } )? , $opcode:literal, $name:literal ; )*) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$attr])*
                $variant $( { $($field: $ty),* } )?,
            )*
        }

        impl Instruction {
            /// The single-byte opcode this operator is encoded as.
            pub fn opcode(&self) -> u8 {
                match self {
                    $(Instruction::$variant { .. } => $opcode,)*
                }
            }

            /// The canonical textual name used by the WAST printer.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Instruction::$variant { .. } => $name,)*
                }
            }
        }
    };
}

// Variants with immediates use struct-call syntax; variants with no payload
// are plain unit variants. The `{ .. }` pattern in opcode()/name() matches
// both, since struct-rest patterns are legal on unit variants too.
define_operators! {
    Unreachable, 0x00, "unreachable";
    Nop, 0x01, "nop";
    /// Pushes a new control frame with the given branch-argument/result type.
    Block { result: ResultType }, 0x02, "block";
    Loop { result: ResultType }, 0x03, "loop";
    If { result: ResultType }, 0x04, "if";
    Else, 0x05, "else";
    End, 0x0b, "end";
    Br { depth: LabelIdx }, 0x0c, "br";
    BrIf { depth: LabelIdx }, 0x0d, "br_if";
    BrTableOp { table: BrTable }, 0x0e, "br_table";
    Return, 0x0f, "return";
    Call { func: FuncIdx }, 0x10, "call";
    CallIndirect { ty: TypeIdx, table: TableIdx }, 0x11, "call_indirect";

    Drop, 0x1a, "drop";
    Select, 0x1b, "select";

    LocalGet { local: LocalIdx }, 0x20, "local.get";
    LocalSet { local: LocalIdx }, 0x21, "local.set";
    LocalTee { local: LocalIdx }, 0x22, "local.tee";
    GlobalGet { global: GlobalIdx }, 0x23, "global.get";
    GlobalSet { global: GlobalIdx }, 0x24, "global.set";

    I32Load { memarg: MemArg }, 0x28, "i32.load";
    I64Load { memarg: MemArg }, 0x29, "i64.load";
    F32Load { memarg: MemArg }, 0x2a, "f32.load";
    F64Load { memarg: MemArg }, 0x2b, "f64.load";
    I32Load8S { memarg: MemArg }, 0x2c, "i32.load8_s";
    I32Load8U { memarg: MemArg }, 0x2d, "i32.load8_u";
    I32Load16S { memarg: MemArg }, 0x2e, "i32.load16_s";
    I32Load16U { memarg: MemArg }, 0x2f, "i32.load16_u";
    I64Load8S { memarg: MemArg }, 0x30, "i64.load8_s";
    I64Load8U { memarg: MemArg }, 0x31, "i64.load8_u";
    I64Load16S { memarg: MemArg }, 0x32, "i64.load16_s";
    I64Load16U { memarg: MemArg }, 0x33, "i64.load16_u";
    I64Load32S { memarg: MemArg }, 0x34, "i64.load32_s";
    I64Load32U { memarg: MemArg }, 0x35, "i64.load32_u";
    I32Store { memarg: MemArg }, 0x36, "i32.store";
    I64Store { memarg: MemArg }, 0x37, "i64.store";
    F32Store { memarg: MemArg }, 0x38, "f32.store";
    F64Store { memarg: MemArg }, 0x39, "f64.store";
    I32Store8 { memarg: MemArg }, 0x3a, "i32.store8";
    I32Store16 { memarg: MemArg }, 0x3b, "i32.store16";
    I64Store8 { memarg: MemArg }, 0x3c, "i64.store8";
    I64Store16 { memarg: MemArg }, 0x3d, "i64.store16";
    I64Store32 { memarg: MemArg }, 0x3e, "i64.store32";
    MemorySize, 0x3f, "memory.size";
    MemoryGrow, 0x40, "memory.grow";

    I32Const { value: i32 }, 0x41, "i32.const";
    I64Const { value: i64 }, 0x42, "i64.const";
    F32Const { bits: u32 }, 0x43, "f32.const";
    F64Const { bits: u64 }, 0x44, "f64.const";

    I32Eqz, 0x45, "i32.eqz";
    I32Eq, 0x46, "i32.eq";
    I32Ne, 0x47, "i32.ne";
    I32LtS, 0x48, "i32.lt_s";
    I32LtU, 0x49, "i32.lt_u";
    I32GtS, 0x4a, "i32.gt_s";
    I32GtU, 0x4b, "i32.gt_u";
    I32LeS, 0x4c, "i32.le_s";
    I32LeU, 0x4d, "i32.le_u";
    I32GeS, 0x4e, "i32.ge_s";
    I32GeU, 0x4f, "i32.ge_u";

    I64Eqz, 0x50, "i64.eqz";
    I64Eq, 0x51, "i64.eq";
    I64Ne, 0x52, "i64.ne";
    I64LtS, 0x53, "i64.lt_s";
    I64LtU, 0x54, "i64.lt_u";
    I64GtS, 0x55, "i64.gt_s";
    I64GtU, 0x56, "i64.gt_u";
    I64LeS, 0x57, "i64.le_s";
    I64LeU, 0x58, "i64.le_u";
    I64GeS, 0x59, "i64.ge_s";
    I64GeU, 0x5a, "i64.ge_u";

    F32Eq, 0x5b, "f32.eq";
    F32Ne, 0x5c, "f32.ne";
    F32Lt, 0x5d, "f32.lt";
    F32Gt, 0x5e, "f32.gt";
    F32Le, 0x5f, "f32.le";
    F32Ge, 0x60, "f32.ge";

    F64Eq, 0x61, "f64.eq";
    F64Ne, 0x62, "f64.ne";
    F64Lt, 0x63, "f64.lt";
    F64Gt, 0x64, "f64.gt";
    F64Le, 0x65, "f64.le";
    F64Ge, 0x66, "f64.ge";

    I32Clz, 0x67, "i32.clz";
    I32Ctz, 0x68, "i32.ctz";
    I32Popcnt, 0x69, "i32.popcnt";
    I32Add, 0x6a, "i32.add";
    I32Sub, 0x6b, "i32.sub";
    I32Mul, 0x6c, "i32.mul";
    I32DivS, 0x6d, "i32.div_s";
    I32DivU, 0x6e, "i32.div_u";
    I32RemS, 0x6f, "i32.rem_s";
    I32RemU, 0x70, "i32.rem_u";
    I32And, 0x71, "i32.and";
    I32Or, 0x72, "i32.or";
    I32Xor, 0x73, "i32.xor";
    I32Shl, 0x74, "i32.shl";
    I32ShrS, 0x75, "i32.shr_s";
    I32ShrU, 0x76, "i32.shr_u";
    I32Rotl, 0x77, "i32.rotl";
    I32Rotr, 0x78, "i32.rotr";

    I64Clz, 0x79, "i64.clz";
    I64Ctz, 0x7a, "i64.ctz";
    I64Popcnt, 0x7b, "i64.popcnt";
    I64Add, 0x7c, "i64.add";
    I64Sub, 0x7d, "i64.sub";
    I64Mul, 0x7e, "i64.mul";
    I64DivS, 0x7f, "i64.div_s";
    I64DivU, 0x80, "i64.div_u";
    I64RemS, 0x81, "i64.rem_s";
    I64RemU, 0x82, "i64.rem_u";
    I64And, 0x83, "i64.and";
    I64Or, 0x84, "i64.or";
    I64Xor, 0x85, "i64.xor";
    I64Shl, 0x86, "i64.shl";
    I64ShrS, 0x87, "i64.shr_s";
    I64ShrU, 0x88, "i64.shr_u";
    I64Rotl, 0x89, "i64.rotl";
    I64Rotr, 0x8a, "i64.rotr";

    F32Abs, 0x8b, "f32.abs";
    F32Neg, 0x8c, "f32.neg";
    F32Ceil, 0x8d, "f32.ceil";
    F32Floor, 0x8e, "f32.floor";
    F32Trunc, 0x8f, "f32.trunc";
    F32Nearest, 0x90, "f32.nearest";
    F32Sqrt, 0x91, "f32.sqrt";
    F32Add, 0x92, "f32.add";
    F32Sub, 0x93, "f32.sub";
    F32Mul, 0x94, "f32.mul";
    F32Div, 0x95, "f32.div";
    F32Min, 0x96, "f32.min";
    F32Max, 0x97, "f32.max";
    F32Copysign, 0x98, "f32.copysign";

    F64Abs, 0x99, "f64.abs";
    F64Neg, 0x9a, "f64.neg";
    F64Ceil, 0x9b, "f64.ceil";
    F64Floor, 0x9c, "f64.floor";
    F64Trunc, 0x9d, "f64.trunc";
    F64Nearest, 0x9e, "f64.nearest";
    F64Sqrt, 0x9f, "f64.sqrt";
    F64Add, 0xa0, "f64.add";
    F64Sub, 0xa1, "f64.sub";
    F64Mul, 0xa2, "f64.mul";
    F64Div, 0xa3, "f64.div";
    F64Min, 0xa4, "f64.min";
    F64Max, 0xa5, "f64.max";
    F64Copysign, 0xa6, "f64.copysign";

    I32WrapI64, 0xa7, "i32.wrap_i64";
    I32TruncF32S, 0xa8, "i32.trunc_f32_s";
    I32TruncF32U, 0xa9, "i32.trunc_f32_u";
    I32TruncF64S, 0xaa, "i32.trunc_f64_s";
    I32TruncF64U, 0xab, "i32.trunc_f64_u";
    I64ExtendI32S, 0xac, "i64.extend_i32_s";
    I64ExtendI32U, 0xad, "i64.extend_i32_u";
    I64TruncF32S, 0xae, "i64.trunc_f32_s";
    I64TruncF32U, 0xaf, "i64.trunc_f32_u";
    I64TruncF64S, 0xb0, "i64.trunc_f64_s";
    I64TruncF64U, 0xb1, "i64.trunc_f64_u";
    F32ConvertI32S, 0xb2, "f32.convert_i32_s";
    F32ConvertI32U, 0xb3, "f32.convert_i32_u";
    F32ConvertI64S, 0xb4, "f32.convert_i64_s";
    F32ConvertI64U, 0xb5, "f32.convert_i64_u";
    F32DemoteF64, 0xb6, "f32.demote_f64";
    F64ConvertI32S, 0xb7, "f64.convert_i32_s";
    F64ConvertI32U, 0xb8, "f64.convert_i32_u";
    F64ConvertI64S, 0xb9, "f64.convert_i64_s";
    F64ConvertI64U, 0xba, "f64.convert_i64_u";
    F64PromoteF32, 0xbb, "f64.promote_f32";
    I32ReinterpretF32, 0xbc, "i32.reinterpret_f32";
    I64ReinterpretF64, 0xbd, "i64.reinterpret_f64";
    F32ReinterpretI32, 0xbe, "f32.reinterpret_i32";
    F64ReinterpretI64, 0xbf, "f64.reinterpret_i64";
}

/// The fixed, context-free part of an operator's stack signature: what it
/// pops and what it pushes. Control-flow operators, `call`/`call_indirect`,
/// the local/global accessors, and the memory ops all need information from
/// outside the operator itself (frame types, function types, local types,
/// whether a memory/table is declared) and are handled directly by the
/// validator instead of through this table.
pub struct Signature {
    pub pops: &'static [ValueType],
    pub push: Option<ValueType>,
}

use ValueType::{F32, F64, I32, I64};

impl Instruction {
    /// The simple (context-free) stack signature for every operator that
    /// isn't control flow, a variable accessor, a call, or a memory access.
    pub fn simple_signature(&self) -> Option<Signature> {
        const fn sig(pops: &'static [ValueType], push: Option<ValueType>) -> Signature {
            Signature { pops, push }
        }
        Some(match self {
            Instruction::I32Const { .. } => sig(&[], Some(I32)),
            Instruction::I64Const { .. } => sig(&[], Some(I64)),
            Instruction::F32Const { .. } => sig(&[], Some(F32)),
            Instruction::F64Const { .. } => sig(&[], Some(F64)),

            Instruction::I32Eqz => sig(&[I32], Some(I32)),
            Instruction::I32Eq
            | Instruction::I32Ne
            | Instruction::I32LtS
            | Instruction::I32LtU
            | Instruction::I32GtS
            | Instruction::I32GtU
            | Instruction::I32LeS
            | Instruction::I32LeU
            | Instruction::I32GeS
            | Instruction::I32GeU => sig(&[I32, I32], Some(I32)),

            Instruction::I64Eqz => sig(&[I64], Some(I32)),
            Instruction::I64Eq
            | Instruction::I64Ne
            | Instruction::I64LtS
            | Instruction::I64LtU
            | Instruction::I64GtS
            | Instruction::I64GtU
            | Instruction::I64LeS
            | Instruction::I64LeU
            | Instruction::I64GeS
            | Instruction::I64GeU => sig(&[I64, I64], Some(I32)),

            Instruction::F32Eq
            | Instruction::F32Ne
            | Instruction::F32Lt
            | Instruction::F32Gt
            | Instruction::F32Le
            | Instruction::F32Ge => sig(&[F32, F32], Some(I32)),

            Instruction::F64Eq
            | Instruction::F64Ne
            | Instruction::F64Lt
            | Instruction::F64Gt
            | Instruction::F64Le
            | Instruction::F64Ge => sig(&[F64, F64], Some(I32)),

            Instruction::I32Clz | Instruction::I32Ctz | Instruction::I32Popcnt => sig(&[I32], Some(I32)),
            Instruction::I32Add
            | Instruction::I32Sub
            | Instruction::I32Mul
            | Instruction::I32DivS
            | Instruction::I32DivU
            | Instruction::I32RemS
            | Instruction::I32RemU
            | Instruction::I32And
            | Instruction::I32Or
            | Instruction::I32Xor
            | Instruction::I32Shl
            | Instruction::I32ShrS
            | Instruction::I32ShrU
            | Instruction::I32Rotl
            | Instruction::I32Rotr => sig(&[I32, I32], Some(I32)),

            Instruction::I64Clz | Instruction::I64Ctz | Instruction::I64Popcnt => sig(&[I64], Some(I64)),
            Instruction::I64Add
            | Instruction::I64Sub
            | Instruction::I64Mul
            | Instruction::I64DivS
            | Instruction::I64DivU
            | Instruction::I64RemS
            | Instruction::I64RemU
            | Instruction::I64And
            | Instruction::I64Or
            | Instruction::I64Xor
            | Instruction::I64Shl
            | Instruction::I64ShrS
            | Instruction::I64ShrU
            | Instruction::I64Rotl
            | Instruction::I64Rotr => sig(&[I64, I64], Some(I64)),

            Instruction::F32Abs
            | Instruction::F32Neg
            | Instruction::F32Ceil
            | Instruction::F32Floor
            | Instruction::F32Trunc
            | Instruction::F32Nearest
            | Instruction::F32Sqrt => sig(&[F32], Some(F32)),
            Instruction::F32Add
            | Instruction::F32Sub
            | Instruction::F32Mul
            | Instruction::F32Div
            | Instruction::F32Min
            | Instruction::F32Max
            | Instruction::F32Copysign => sig(&[F32, F32], Some(F32)),

            Instruction::F64Abs
            | Instruction::F64Neg
            | Instruction::F64Ceil
            | Instruction::F64Floor
            | Instruction::F64Trunc
            | Instruction::F64Nearest
            | Instruction::F64Sqrt => sig(&[F64], Some(F64)),
            Instruction::F64Add
            | Instruction::F64Sub
            | Instruction::F64Mul
            | Instruction::F64Div
            | Instruction::F64Min
            | Instruction::F64Max
            | Instruction::F64Copysign => sig(&[F64, F64], Some(F64)),

            Instruction::I32WrapI64 => sig(&[I64], Some(I32)),
            Instruction::I32TruncF32S | Instruction::I32TruncF32U => sig(&[F32], Some(I32)),
            Instruction::I32TruncF64S | Instruction::I32TruncF64U => sig(&[F64], Some(I32)),
            Instruction::I64ExtendI32S | Instruction::I64ExtendI32U => sig(&[I32], Some(I64)),
            Instruction::I64TruncF32S | Instruction::I64TruncF32U => sig(&[F32], Some(I64)),
            Instruction::I64TruncF64S | Instruction::I64TruncF64U => sig(&[F64], Some(I64)),
            Instruction::F32ConvertI32S | Instruction::F32ConvertI32U => sig(&[I32], Some(F32)),
            Instruction::F32ConvertI64S | Instruction::F32ConvertI64U => sig(&[I64], Some(F32)),
            Instruction::F32DemoteF64 => sig(&[F64], Some(F32)),
            Instruction::F64ConvertI32S | Instruction::F64ConvertI32U => sig(&[I32], Some(F64)),
            Instruction::F64ConvertI64S | Instruction::F64ConvertI64U => sig(&[I64], Some(F64)),
            Instruction::F64PromoteF32 => sig(&[F32], Some(F64)),
            Instruction::I32ReinterpretF32 => sig(&[F32], Some(I32)),
            Instruction::I64ReinterpretF64 => sig(&[F64], Some(I64)),
            Instruction::F32ReinterpretI32 => sig(&[I32], Some(F32)),
            Instruction::F64ReinterpretI64 => sig(&[I64], Some(F64)),

            Instruction::MemorySize => sig(&[], Some(I32)),
            Instruction::MemoryGrow => sig(&[I32], Some(I32)),

            _ => return None,
        })
    }

    /// Memory load/store operators carry `(memarg, value_type, is_store)`.
    pub fn memory_access(&self) -> Option<(MemArg, ValueType, bool)> {
        macro_rules! load {
            ($self:ident, $variant:ident, $ty:expr) => {
                if let Instruction::$variant { memarg } = $self {
                    return Some((*memarg, $ty, false));
                }
            };
        }
        macro_rules! store {
            ($self:ident, $variant:ident, $ty:expr) => {
                if let Instruction::$variant { memarg } = $self {
                    return Some((*memarg, $ty, true));
                }
            };
        }
        load!(self, I32Load, I32);
        load!(self, I64Load, I64);
        load!(self, F32Load, F32);
        load!(self, F64Load, F64);
        load!(self, I32Load8S, I32);
        load!(self, I32Load8U, I32);
        load!(self, I32Load16S, I32);
        load!(self, I32Load16U, I32);
        load!(self, I64Load8S, I64);
        load!(self, I64Load8U, I64);
        load!(self, I64Load16S, I64);
        load!(self, I64Load16U, I64);
        load!(self, I64Load32S, I64);
        load!(self, I64Load32U, I64);
        store!(self, I32Store, I32);
        store!(self, I64Store, I64);
        store!(self, F32Store, F32);
        store!(self, F64Store, F64);
        store!(self, I32Store8, I32);
        store!(self, I32Store16, I32);
        store!(self, I64Store8, I64);
        store!(self, I64Store16, I64);
        store!(self, I64Store32, I64);
        None
    }

    /// Natural alignment (log2 of bytes) of a memory access, used by the
    /// validator to reject an over-large declared alignment.
    pub fn natural_alignment_log2(&self) -> Option<u32> {
        Some(match self {
            Instruction::I32Load8S { .. } | Instruction::I32Load8U { .. } | Instruction::I32Store8 { .. } => 0,
            Instruction::I32Load16S { .. } | Instruction::I32Load16U { .. } | Instruction::I32Store16 { .. } => 1,
            Instruction::I64Load8S { .. } | Instruction::I64Load8U { .. } | Instruction::I64Store8 { .. } => 0,
            Instruction::I64Load16S { .. } | Instruction::I64Load16U { .. } | Instruction::I64Store16 { .. } => 1,
            Instruction::I64Load32S { .. } | Instruction::I64Load32U { .. } | Instruction::I64Store32 { .. } => 2,
            Instruction::I32Load { .. } | Instruction::I32Store { .. } | Instruction::F32Load { .. } | Instruction::F32Store { .. } => 2,
            Instruction::I64Load { .. } | Instruction::I64Store { .. } | Instruction::F64Load { .. } | Instruction::F64Store { .. } => 3,
            _ => return None,
        })
    }
}
