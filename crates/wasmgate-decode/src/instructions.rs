//! Opcode-by-opcode instruction decoding, plus const-expression and
//! function-body framing.

extern crate alloc;
use alloc::vec::Vec;

use crate::binary_reader::BinaryReader;
use crate::error::{Error, Result};
use wasmgate_ir::{BrTable, ConstExpr, Instruction, MemArg};
use wasmgate_types::ResultType;

impl<'a> BinaryReader<'a> {
    pub fn read_memarg(&mut self) -> Result<MemArg> {
        let align = self.read_u32_leb128()?;
        let offset = self.read_u32_leb128()?;
        Ok(MemArg { align, offset })
    }

    /// A block's declared type: `0x40` for empty, else a single value type.
    /// The data model has no function-type-referencing block form (that is
    /// the multi-value proposal), so anything else is rejected here rather
    /// than deferred to the validator.
    pub fn read_block_result(&mut self) -> Result<ResultType> {
        let offset = self.pos;
        if self.peek_u8()? == 0x40 {
            self.pos += 1;
            return Ok(ResultType::None);
        }
        match self.read_value_type() {
            Ok(v) => Ok(ResultType::Value(v)),
            Err(_) => Err(Error::UnknownValueType {
                tag: self.bytes[offset],
                offset,
            }),
        }
    }

    pub fn read_br_table(&mut self) -> Result<BrTable> {
        let count = self.read_u32_leb128()? as usize;
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            targets.push(self.read_label_idx()?);
        }
        let default = self.read_label_idx()?;
        Ok(BrTable { targets, default })
    }

    /// Decode one instruction. `End`/`Else` are returned like any other
    /// opcode; callers track nesting themselves (see [`read_const_expr`] and
    /// the validator's body pass).
    pub fn read_instruction(&mut self) -> Result<Instruction> {
        let offset = self.pos;
        let opcode = self.read_u8()?;
        Ok(match opcode {
            0x00 => Instruction::Unreachable,
            0x01 => Instruction::Nop,
            0x02 => Instruction::Block {
                result: self.read_block_result()?,
            },
            0x03 => Instruction::Loop {
                result: self.read_block_result()?,
            },
            0x04 => Instruction::If {
                result: self.read_block_result()?,
            },
            0x05 => Instruction::Else,
            0x0b => Instruction::End,
            0x0c => Instruction::Br {
                depth: self.read_label_idx()?,
            },
            0x0d => Instruction::BrIf {
                depth: self.read_label_idx()?,
            },
            0x0e => Instruction::BrTableOp {
                table: self.read_br_table()?,
            },
            0x0f => Instruction::Return,
            0x10 => Instruction::Call {
                func: self.read_func_idx()?,
            },
            0x11 => {
                let ty = self.read_type_idx()?;
                let table_tag = self.read_u8()?;
                if table_tag != 0x00 {
                    return Err(Error::UnknownExternalKind {
                        tag: table_tag,
                        offset: self.pos - 1,
                    });
                }
                Instruction::CallIndirect {
                    ty,
                    table: wasmgate_ir::TableIdx::from_u32(0),
                }
            }
            0x1a => Instruction::Drop,
            0x1b => Instruction::Select,
            0x20 => Instruction::LocalGet {
                local: self.read_local_idx()?,
            },
            0x21 => Instruction::LocalSet {
                local: self.read_local_idx()?,
            },
            0x22 => Instruction::LocalTee {
                local: self.read_local_idx()?,
            },
            0x23 => Instruction::GlobalGet {
                global: self.read_global_idx()?,
            },
            0x24 => Instruction::GlobalSet {
                global: self.read_global_idx()?,
            },
            0x28 => Instruction::I32Load { memarg: self.read_memarg()? },
            0x29 => Instruction::I64Load { memarg: self.read_memarg()? },
            0x2a => Instruction::F32Load { memarg: self.read_memarg()? },
            0x2b => Instruction::F64Load { memarg: self.read_memarg()? },
            0x2c => Instruction::I32Load8S { memarg: self.read_memarg()? },
            0x2d => Instruction::I32Load8U { memarg: self.read_memarg()? },
            0x2e => Instruction::I32Load16S { memarg: self.read_memarg()? },
            0x2f => Instruction::I32Load16U { memarg: self.read_memarg()? },
            0x30 => Instruction::I64Load8S { memarg: self.read_memarg()? },
            0x31 => Instruction::I64Load8U { memarg: self.read_memarg()? },
            0x32 => Instruction::I64Load16S { memarg: self.read_memarg()? },
            0x33 => Instruction::I64Load16U { memarg: self.read_memarg()? },
            0x34 => Instruction::I64Load32S { memarg: self.read_memarg()? },
            0x35 => Instruction::I64Load32U { memarg: self.read_memarg()? },
            0x36 => Instruction::I32Store { memarg: self.read_memarg()? },
            0x37 => Instruction::I64Store { memarg: self.read_memarg()? },
            0x38 => Instruction::F32Store { memarg: self.read_memarg()? },
            0x39 => Instruction::F64Store { memarg: self.read_memarg()? },
            0x3a => Instruction::I32Store8 { memarg: self.read_memarg()? },
            0x3b => Instruction::I32Store16 { memarg: self.read_memarg()? },
            0x3c => Instruction::I64Store8 { memarg: self.read_memarg()? },
            0x3d => Instruction::I64Store16 { memarg: self.read_memarg()? },
            0x3e => Instruction::I64Store32 { memarg: self.read_memarg()? },
            0x3f => {
                self.expect_reserved_zero_byte()?;
                Instruction::MemorySize
            }
            0x40 => {
                self.expect_reserved_zero_byte()?;
                Instruction::MemoryGrow
            }
            0x41 => Instruction::I32Const { value: self.read_i32_leb128()? },
            0x42 => Instruction::I64Const { value: self.read_i64_leb128()? },
            0x43 => Instruction::F32Const { bits: self.read_f32_bits()? },
            0x44 => Instruction::F64Const { bits: self.read_f64_bits()? },
            0x45 => Instruction::I32Eqz,
            0x46 => Instruction::I32Eq,
            0x47 => Instruction::I32Ne,
            0x48 => Instruction::I32LtS,
            0x49 => Instruction::I32LtU,
            0x4a => Instruction::I32GtS,
            0x4b => Instruction::I32GtU,
            0x4c => Instruction::I32LeS,
            0x4d => Instruction::I32LeU,
            0x4e => Instruction::I32GeS,
            0x4f => Instruction::I32GeU,
            0x50 => Instruction::I64Eqz,
            0x51 => Instruction::I64Eq,
            0x52 => Instruction::I64Ne,
            0x53 => Instruction::I64LtS,
            0x54 => Instruction::I64LtU,
            0x55 => Instruction::I64GtS,
            0x56 => Instruction::I64GtU,
            0x57 => Instruction::I64LeS,
            0x58 => Instruction::I64LeU,
            0x59 => Instruction::I64GeS,
            0x5a => Instruction::I64GeU,
            0x5b => Instruction::F32Eq,
            0x5c => Instruction::F32Ne,
            0x5d => Instruction::F32Lt,
            0x5e => Instruction::F32Gt,
            0x5f => Instruction::F32Le,
            0x60 => Instruction::F32Ge,
            0x61 => Instruction::F64Eq,
            0x62 => Instruction::F64Ne,
            0x63 => Instruction::F64Lt,
            0x64 => Instruction::F64Gt,
            0x65 => Instruction::F64Le,
            0x66 => Instruction::F64Ge,
            0x67 => Instruction::I32Clz,
            0x68 => Instruction::I32Ctz,
            0x69 => Instruction::I32Popcnt,
            0x6a => Instruction::I32Add,
            0x6b => Instruction::I32Sub,
            0x6c => Instruction::I32Mul,
            0x6d => Instruction::I32DivS,
            0x6e => Instruction::I32DivU,
            0x6f => Instruction::I32RemS,
            0x70 => Instruction::I32RemU,
            0x71 => Instruction::I32And,
            0x72 => Instruction::I32Or,
            0x73 => Instruction::I32Xor,
            0x74 => Instruction::I32Shl,
            0x75 => Instruction::I32ShrS,
            0x76 => Instruction::I32ShrU,
            0x77 => Instruction::I32Rotl,
            0x78 => Instruction::I32Rotr,
            0x79 => Instruction::I64Clz,
            0x7a => Instruction::I64Ctz,
            0x7b => Instruction::I64Popcnt,
            0x7c => Instruction::I64Add,
            0x7d => Instruction::I64Sub,
            0x7e => Instruction::I64Mul,
            0x7f => Instruction::I64DivS,
            0x80 => Instruction::I64DivU,
            0x81 => Instruction::I64RemS,
            0x82 => Instruction::I64RemU,
            0x83 => Instruction::I64And,
            0x84 => Instruction::I64Or,
            0x85 => Instruction::I64Xor,
            0x86 => Instruction::I64Shl,
            0x87 => Instruction::I64ShrS,
            0x88 => Instruction::I64ShrU,
            0x89 => Instruction::I64Rotl,
            0x8a => Instruction::I64Rotr,
            0x8b => Instruction::F32Abs,
            0x8c => Instruction::F32Neg,
            0x8d => Instruction::F32Ceil,
            0x8e => Instruction::F32Floor,
            0x8f => Instruction::F32Trunc,
            0x90 => Instruction::F32Nearest,
            0x91 => Instruction::F32Sqrt,
            0x92 => Instruction::F32Add,
            0x93 => Instruction::F32Sub,
            0x94 => Instruction::F32Mul,
            0x95 => Instruction::F32Div,
            0x96 => Instruction::F32Min,
            0x97 => Instruction::F32Max,
            0x98 => Instruction::F32Copysign,
            0x99 => Instruction::F64Abs,
            0x9a => Instruction::F64Neg,
            0x9b => Instruction::F64Ceil,
            0x9c => Instruction::F64Floor,
            0x9d => Instruction::F64Trunc,
            0x9e => Instruction::F64Nearest,
            0x9f => Instruction::F64Sqrt,
            0xa0 => Instruction::F64Add,
            0xa1 => Instruction::F64Sub,
            0xa2 => Instruction::F64Mul,
            0xa3 => Instruction::F64Div,
            0xa4 => Instruction::F64Min,
            0xa5 => Instruction::F64Max,
            0xa6 => Instruction::F64Copysign,
            0xa7 => Instruction::I32WrapI64,
            0xa8 => Instruction::I32TruncF32S,
            0xa9 => Instruction::I32TruncF32U,
            0xaa => Instruction::I32TruncF64S,
            0xab => Instruction::I32TruncF64U,
            0xac => Instruction::I64ExtendI32S,
            0xad => Instruction::I64ExtendI32U,
            0xae => Instruction::I64TruncF32S,
            0xaf => Instruction::I64TruncF32U,
            0xb0 => Instruction::I64TruncF64S,
            0xb1 => Instruction::I64TruncF64U,
            0xb2 => Instruction::F32ConvertI32S,
            0xb3 => Instruction::F32ConvertI32U,
            0xb4 => Instruction::F32ConvertI64S,
            0xb5 => Instruction::F32ConvertI64U,
            0xb6 => Instruction::F32DemoteF64,
            0xb7 => Instruction::F64ConvertI32S,
            0xb8 => Instruction::F64ConvertI32U,
            0xb9 => Instruction::F64ConvertI64S,
            0xba => Instruction::F64ConvertI64U,
            0xbb => Instruction::F64PromoteF32,
            0xbc => Instruction::I32ReinterpretF32,
            0xbd => Instruction::I64ReinterpretF64,
            0xbe => Instruction::F32ReinterpretI32,
            0xbf => Instruction::F64ReinterpretI64,
            opcode => return Err(Error::UnknownOpcode { opcode, offset }),
        })
    }

    fn expect_reserved_zero_byte(&mut self) -> Result<()> {
        let offset = self.pos;
        let tag = self.read_u8()?;
        if tag != 0x00 {
            return Err(Error::UnknownExternalKind { tag, offset });
        }
        Ok(())
    }

    /// Reads a restricted constant expression: any number of `const`s and
    /// `global.get`s followed by a terminating `end`. The validator, not
    /// this reader, enforces that the expression is a single value-producing
    /// instruction.
    pub fn read_const_expr(&mut self) -> Result<ConstExpr> {
        let mut instructions = Vec::new();
        loop {
            let instr = self.read_instruction()?;
            let is_end = matches!(instr, Instruction::End);
            instructions.push(instr);
            if is_end {
                break;
            }
        }
        instructions.pop();
        Ok(ConstExpr::new(instructions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_const_then_end() {
        let mut r = BinaryReader::new(&[0x41, 0x2a, 0x0b]);
        let expr = r.read_const_expr().unwrap();
        assert_eq!(expr.instructions, alloc::vec![Instruction::I32Const { value: 42 }]);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut r = BinaryReader::new(&[0xff]);
        assert!(matches!(r.read_instruction(), Err(Error::UnknownOpcode { opcode: 0xff, .. })));
    }
}
