//! A growable byte buffer with LEB128 writers, the bit-exact inverse of
//! `wasmgate_decode::BinaryReader`'s readers.

extern crate alloc;

use alloc::vec::Vec;
use wasmgate_types::{ElementType, GlobalType, MemoryType, Mutability, ResultType, SizeConstraint, TableType, ValueType};

#[derive(Debug, Default)]
pub struct ByteWriter {
    pub buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, b: u8) {
        self.buf.push(b);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u32_leb128(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                break;
            }
            self.write_u8(byte | 0x80);
        }
    }

    pub fn write_u64_leb128(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                break;
            }
            self.write_u8(byte | 0x80);
        }
    }

    /// Signed LEB128: the canonical minimal-length encoding (stop once the
    /// remaining bits are a correct sign-extension of the last byte written).
    pub fn write_i64_leb128(&mut self, mut value: i64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            let done = (value == 0 && (byte & 0x40) == 0) || (value == -1 && (byte & 0x40) != 0);
            if done {
                self.write_u8(byte);
                break;
            }
            self.write_u8(byte | 0x80);
        }
    }

    pub fn write_i32_leb128(&mut self, value: i32) {
        self.write_i64_leb128(value as i64);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_u32_leb128(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    pub fn write_f32_bits(&mut self, bits: u32) {
        self.write_bytes(&bits.to_le_bytes());
    }

    pub fn write_f64_bits(&mut self, bits: u64) {
        self.write_bytes(&bits.to_le_bytes());
    }

    pub fn write_value_type(&mut self, ty: ValueType) {
        self.write_u8(match ty {
            ValueType::I32 => 0x7f,
            ValueType::I64 => 0x7e,
            ValueType::F32 => 0x7d,
            ValueType::F64 => 0x7c,
        });
    }

    pub fn write_result_type(&mut self, ty: ResultType) {
        match ty {
            ResultType::None => self.write_u32_leb128(0),
            ResultType::Value(v) => {
                self.write_u32_leb128(1);
                self.write_value_type(v);
            }
        }
    }

    pub fn write_element_type(&mut self, ty: ElementType) {
        self.write_u8(match ty {
            ElementType::FuncRef => 0x70,
        });
    }

    pub fn write_limits(&mut self, limits: &SizeConstraint) {
        match limits.max {
            None => {
                self.write_u8(0x00);
                self.write_u32_leb128(limits.min);
            }
            Some(max) => {
                self.write_u8(0x01);
                self.write_u32_leb128(limits.min);
                self.write_u32_leb128(max);
            }
        }
    }

    pub fn write_table_type(&mut self, ty: &TableType) {
        self.write_element_type(ty.element);
        self.write_limits(&ty.limits);
    }

    pub fn write_memory_type(&mut self, ty: &MemoryType) {
        self.write_limits(&ty.limits);
    }

    pub fn write_mutability(&mut self, m: Mutability) {
        self.write_u8(match m {
            Mutability::Const => 0x00,
            Mutability::Var => 0x01,
        });
    }

    pub fn write_global_type(&mut self, ty: GlobalType) {
        self.write_value_type(ty.value);
        self.write_mutability(ty.mutability);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_leb128_round_trips_minimal_length() {
        let mut w = ByteWriter::new();
        w.write_u32_leb128(624485);
        // 624485 = 0b10011000011101100101, canonical encoding is 3 bytes.
        assert_eq!(w.buf, alloc::vec![0xe5, 0x8e, 0x26]);
    }

    #[test]
    fn signed_leb128_encodes_negative_minimally() {
        let mut w = ByteWriter::new();
        w.write_i32_leb128(-1);
        assert_eq!(w.buf, alloc::vec![0x7f]);
    }

    #[test]
    fn signed_leb128_matches_spec_example() {
        let mut w = ByteWriter::new();
        w.write_i64_leb128(-123456);
        let mut r = wasmgate_decode::BinaryReader::new(&w.buf);
        assert_eq!(r.read_i64_leb128().unwrap(), -123456);
    }
}
