//! A borrowing, zero-copy cursor over a module's bytes. Every `read_*`
//! method advances `pos` and returns a byte-offset-tagged error on failure.

use crate::error::{Error, Result};
use crate::limits::{MAX_WASM_FUNCTION_PARAMS, MAX_WASM_STRING_SIZE};
use wasmgate_ir::{
    DataIdx, ElemIdx, FuncIdx, GlobalIdx, LabelIdx, LocalIdx, MemIdx, TableIdx, TypeIdx,
};
use wasmgate_types::{ElementType, GlobalType, MemoryType, Mutability, ResultType, SizeConstraint, TableType, ValueType};

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

#[derive(Clone)]
pub struct BinaryReader<'a> {
    pub bytes: &'a [u8],
    pub pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn at_offset(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub fn original_position(&self) -> usize {
        self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn ensure(&self, len: usize) -> Result<()> {
        if self.pos + len > self.bytes.len() {
            Err(Error::UnexpectedEof { offset: self.pos })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let b = self.bytes[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.bytes[self.pos])
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let s = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(s)
    }

    /// Raw little-endian IEEE-754, per the format's float encoding. *Not*
    /// LEB128, unlike integer literals.
    pub fn read_f32_bits(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_f64_bits(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_uleb128(&mut self, max_bits: u32) -> Result<u64> {
        let start = self.pos;
        let max_bytes = max_bits.div_ceil(7) as usize;
        let mut result: u64 = 0;
        let mut shift = 0u32;
        for i in 0..max_bytes {
            let byte = self.read_u8()?;
            let low_bits = (byte & 0x7f) as u64;
            if i == max_bytes - 1 {
                // The final permitted byte may only carry the remaining
                // significant bits; anything above that is out of range.
                let remaining_bits = max_bits - shift;
                if remaining_bits < 7 && (low_bits >> remaining_bits) != 0 {
                    return Err(Error::Leb128OutOfRange { offset: start });
                }
            }
            result |= low_bits << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(Error::OverlongLeb128 { offset: start })
    }

    fn read_sleb128(&mut self, max_bits: u32) -> Result<i64> {
        let start = self.pos;
        let max_bytes = max_bits.div_ceil(7) as usize;
        let mut result: i64 = 0;
        let mut shift = 0u32;
        let mut byte;
        let mut i = 0;
        loop {
            if i == max_bytes {
                return Err(Error::OverlongLeb128 { offset: start });
            }
            byte = self.read_u8()?;
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            i += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        if shift < 64 && (byte & 0x40) != 0 {
            result |= -1i64 << shift;
        }
        Ok(result)
    }

    pub fn read_u32_leb128(&mut self) -> Result<u32> {
        Ok(self.read_uleb128(32)? as u32)
    }

    pub fn read_u64_leb128(&mut self) -> Result<u64> {
        self.read_uleb128(64)
    }

    pub fn read_i32_leb128(&mut self) -> Result<i32> {
        Ok(self.read_sleb128(32)? as i32)
    }

    pub fn read_i64_leb128(&mut self) -> Result<i64> {
        self.read_sleb128(64)
    }

    pub fn read_str(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let len = self.read_u32_leb128()? as usize;
        if len > MAX_WASM_STRING_SIZE {
            return Err(Error::StringTooLong {
                len,
                max: MAX_WASM_STRING_SIZE,
                offset: start,
            });
        }
        let bytes = self.read_bytes(len)?;
        core::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8 { offset: start })
    }

    pub fn read_name(&mut self) -> Result<String> {
        Ok(String::from(self.read_str()?))
    }

    pub fn read_value_type(&mut self) -> Result<ValueType> {
        let offset = self.pos;
        Ok(match self.read_u8()? {
            0x7f => ValueType::I32,
            0x7e => ValueType::I64,
            0x7d => ValueType::F32,
            0x7c => ValueType::F64,
            tag => return Err(Error::UnknownValueType { tag, offset }),
        })
    }

    /// A block/function result: zero or one value, never more (the data
    /// model has no representation for multi-value returns).
    pub fn read_result_type(&mut self) -> Result<ResultType> {
        let start = self.pos;
        let count = self.read_u32_leb128()?;
        match count {
            0 => Ok(ResultType::None),
            1 => Ok(ResultType::Value(self.read_value_type()?)),
            _ => Err(Error::MultiValueResult { offset: start }),
        }
    }

    pub fn read_element_type(&mut self) -> Result<ElementType> {
        let offset = self.pos;
        match self.read_u8()? {
            0x70 => Ok(ElementType::FuncRef),
            tag => Err(Error::UnknownElementType { tag, offset }),
        }
    }

    pub fn read_limits(&mut self) -> Result<SizeConstraint> {
        let offset = self.pos;
        let flags = self.read_u8()?;
        match flags {
            0x00 => Ok(SizeConstraint::new(self.read_u32_leb128()?, None)),
            0x01 => {
                let min = self.read_u32_leb128()?;
                let max = self.read_u32_leb128()?;
                Ok(SizeConstraint::new(min, Some(max)))
            }
            tag => Err(Error::UnknownLimitsFlag { tag, offset }),
        }
    }

    pub fn read_table_type(&mut self) -> Result<TableType> {
        let element = self.read_element_type()?;
        let limits = self.read_limits()?;
        Ok(TableType { element, limits })
    }

    pub fn read_memory_type(&mut self) -> Result<MemoryType> {
        Ok(MemoryType {
            limits: self.read_limits()?,
        })
    }

    pub fn read_mutability(&mut self) -> Result<Mutability> {
        let offset = self.pos;
        match self.read_u8()? {
            0x00 => Ok(Mutability::Const),
            0x01 => Ok(Mutability::Var),
            tag => Err(Error::UnknownMutability { tag, offset }),
        }
    }

    pub fn read_global_type(&mut self) -> Result<GlobalType> {
        let value = self.read_value_type()?;
        let mutability = self.read_mutability()?;
        Ok(GlobalType { value, mutability })
    }

    pub fn read_function_type_shape(&mut self) -> Result<(Vec<ValueType>, ResultType)> {
        let form_offset = self.pos;
        let form = self.read_u8()?;
        if form != 0x60 {
            return Err(Error::UnknownValueType { tag: form, offset: form_offset });
        }
        let start = self.pos;
        let param_count = self.read_u32_leb128()? as usize;
        if param_count > MAX_WASM_FUNCTION_PARAMS {
            return Err(Error::VectorTooLong {
                len: param_count,
                max: MAX_WASM_FUNCTION_PARAMS,
                offset: start,
            });
        }
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            params.push(self.read_value_type()?);
        }
        let result = self.read_result_type()?;
        Ok((params, result))
    }

    pub fn read_type_idx(&mut self) -> Result<TypeIdx> {
        Ok(TypeIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_func_idx(&mut self) -> Result<FuncIdx> {
        Ok(FuncIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_table_idx(&mut self) -> Result<TableIdx> {
        Ok(TableIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_mem_idx(&mut self) -> Result<MemIdx> {
        Ok(MemIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_global_idx(&mut self) -> Result<GlobalIdx> {
        Ok(GlobalIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_elem_idx(&mut self) -> Result<ElemIdx> {
        Ok(ElemIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_data_idx(&mut self) -> Result<DataIdx> {
        Ok(DataIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_local_idx(&mut self) -> Result<LocalIdx> {
        Ok(LocalIdx::from_u32(self.read_u32_leb128()?))
    }
    pub fn read_label_idx(&mut self) -> Result<LabelIdx> {
        Ok(LabelIdx::from_u32(self.read_u32_leb128()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_single_byte_unsigned_leb128() {
        let mut r = BinaryReader::new(&[0x01]);
        assert_eq!(r.read_u32_leb128().unwrap(), 1);
    }

    #[test]
    fn rejects_overlong_u32_leb128() {
        // six bytes encoding a value that fits in one: 0x85 continues past
        // the 5-byte maximum for a 32-bit value.
        let mut r = BinaryReader::new(&[0x85, 0x80, 0x80, 0x80, 0x80, 0x00]);
        assert!(matches!(r.read_u32_leb128(), Err(Error::OverlongLeb128 { .. })));
    }

    #[test]
    fn accepts_maximal_five_byte_u32() {
        let mut r = BinaryReader::new(&[0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(r.read_u32_leb128().unwrap(), u32::MAX);
    }

    #[test]
    fn signed_leb128_sign_extends() {
        let mut r = BinaryReader::new(&[0x7f]);
        assert_eq!(r.read_i32_leb128().unwrap(), -1);
    }

    #[test]
    fn floats_are_raw_little_endian_not_leb128() {
        let mut r = BinaryReader::new(&1.5f32.to_le_bytes());
        assert_eq!(f32::from_bits(r.read_f32_bits().unwrap()), 1.5);
    }
}
