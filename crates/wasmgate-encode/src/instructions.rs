//! Instruction encoding: the bit-exact inverse of
//! `wasmgate_decode::instructions::read_instruction`, driven off the same
//! `wasmgate_ir::Instruction` enum every other stage shares.

use crate::writer::ByteWriter;
use wasmgate_ir::{BrTable, Instruction, MemArg};

impl ByteWriter {
    pub fn write_memarg(&mut self, memarg: MemArg) {
        self.write_u32_leb128(memarg.align);
        self.write_u32_leb128(memarg.offset);
    }

    pub fn write_br_table(&mut self, table: &BrTable) {
        self.write_u32_leb128(table.targets.len() as u32);
        for target in &table.targets {
            self.write_u32_leb128(target.as_u32());
        }
        self.write_u32_leb128(table.default.as_u32());
    }

    /// Encode one operator. Opcodes come straight from
    /// [`Instruction::opcode`]; only the immediate shape is matched here.
    pub fn write_instruction(&mut self, instr: &Instruction) {
        self.write_u8(instr.opcode());
        match instr {
            Instruction::Block { result } | Instruction::Loop { result } | Instruction::If { result } => {
                self.write_block_result(*result);
            }
            Instruction::Br { depth } | Instruction::BrIf { depth } => {
                self.write_u32_leb128(depth.as_u32());
            }
            Instruction::BrTableOp { table } => self.write_br_table(table),
            Instruction::Call { func } => self.write_u32_leb128(func.as_u32()),
            Instruction::CallIndirect { ty, table } => {
                self.write_u32_leb128(ty.as_u32());
                self.write_u32_leb128(table.as_u32());
            }
            Instruction::LocalGet { local } | Instruction::LocalSet { local } | Instruction::LocalTee { local } => {
                self.write_u32_leb128(local.as_u32());
            }
            Instruction::GlobalGet { global } | Instruction::GlobalSet { global } => {
                self.write_u32_leb128(global.as_u32());
            }
            Instruction::MemorySize | Instruction::MemoryGrow => self.write_u8(0x00),
            Instruction::I32Const { value } => self.write_i32_leb128(*value),
            Instruction::I64Const { value } => self.write_i64_leb128(*value),
            Instruction::F32Const { bits } => self.write_f32_bits(*bits),
            Instruction::F64Const { bits } => self.write_f64_bits(*bits),
            _ => {
                if let Some((memarg, _, _)) = instr.memory_access() {
                    self.write_memarg(memarg);
                }
                // Every other variant (comparisons, arithmetic, control
                // markers with no payload) carries no immediate beyond the
                // opcode byte already written above.
            }
        }
    }

    /// A block/function result as the decoder's `read_block_result` expects
    /// it: `0x40` for empty, else the single value type byte.
    fn write_block_result(&mut self, result: wasmgate_types::ResultType) {
        match result {
            wasmgate_types::ResultType::None => self.write_u8(0x40),
            wasmgate_types::ResultType::Value(v) => self.write_value_type(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmgate_decode::BinaryReader;

    #[test]
    fn const_expr_round_trips_through_decoder() {
        let instrs = alloc::vec![Instruction::I32Const { value: 42 }, Instruction::End];
        let mut w = ByteWriter::new();
        for i in &instrs {
            w.write_instruction(i);
        }
        let mut r = BinaryReader::new(&w.buf);
        let expr = r.read_const_expr().unwrap();
        assert_eq!(expr.instructions, alloc::vec![Instruction::I32Const { value: 42 }]);
    }

    #[test]
    fn call_indirect_round_trips() {
        let instr = Instruction::CallIndirect {
            ty: wasmgate_ir::TypeIdx::from_u32(3),
            table: wasmgate_ir::TableIdx::from_u32(0),
        };
        let mut w = ByteWriter::new();
        w.write_instruction(&instr);
        let mut r = BinaryReader::new(&w.buf);
        assert_eq!(r.read_instruction().unwrap(), instr);
    }
}
