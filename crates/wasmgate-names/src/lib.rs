//! The disassembly-names codec: encodes and decodes the optional `name`
//! custom section, mapping function/local indices to the identifiers a WAST
//! source used (or that a producer wants to retain for disassembly).
//!
//! Grounded on `libs/wasmparser/src/names.rs`'s subsection layout
//! (`NameSectionReader`, `NameSubsection`, `Naming`, `IndirectNaming`):
//! subsection 0 names the module itself, subsection 1 names functions,
//! subsection 2 names each function's locals. Decoding is lenient: a
//! malformed subsection is dropped with a debug-log entry and decoding
//! continues at the next subsection, rather than failing the whole name
//! section (and the decoder drops the whole section, not the whole module,
//! on a top-level failure).
#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use wasmgate_ir::{FuncIdx, LocalIdx, ModuleNames};

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    #[error("unexpected end of name section at offset {offset:#x}")]
    UnexpectedEof { offset: usize },
    #[error("malformed UTF-8 in name section at offset {offset:#x}")]
    InvalidUtf8 { offset: usize },
    #[error("overlong LEB128 in name section at offset {offset:#x}")]
    OverlongLeb128 { offset: usize },
}

type Result<T> = core::result::Result<T, Error>;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.bytes.get(self.pos).ok_or(Error::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.bytes.len() {
            return Err(Error::UnexpectedEof { offset: self.pos });
        }
        let s = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(s)
    }

    fn read_u32_leb128(&mut self) -> Result<u32> {
        let start = self.pos;
        let mut result: u32 = 0;
        let mut shift = 0u32;
        for i in 0..5 {
            let byte = self.read_u8()?;
            if i == 4 && (byte & 0x70) != 0 {
                return Err(Error::OverlongLeb128 { offset: start });
            }
            result |= ((byte & 0x7f) as u32) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(Error::OverlongLeb128 { offset: start })
    }

    fn read_str(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let len = self.read_u32_leb128()? as usize;
        let bytes = self.read_bytes(len)?;
        core::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8 { offset: start })
    }
}

const SUBSECTION_MODULE: u8 = 0;
const SUBSECTION_FUNCTION: u8 = 1;
const SUBSECTION_LOCAL: u8 = 2;

/// Decode a `name` custom section's payload (the bytes following the
/// section's own `"name"` string) into [`ModuleNames`]. Individual malformed
/// subsections are skipped rather than failing the whole decode.
pub fn decode_name_section(bytes: &[u8]) -> Result<ModuleNames> {
    let mut names = ModuleNames::default();
    let mut c = Cursor::new(bytes);
    while !c.eof() {
        let id = c.read_u8()?;
        let size = c.read_u32_leb128()? as usize;
        let payload_start = c.pos;
        let payload = c.read_bytes(size)?;
        match decode_subsection(id, payload, &mut names) {
            Ok(()) => {}
            Err(e) => log::debug!("dropping malformed name subsection {id} at offset {payload_start:#x}: {e}"),
        }
    }
    Ok(names)
}

fn decode_subsection(id: u8, payload: &[u8], names: &mut ModuleNames) -> Result<()> {
    let mut c = Cursor::new(payload);
    match id {
        SUBSECTION_MODULE => {
            names.module_name = Some(String::from(c.read_str()?));
        }
        SUBSECTION_FUNCTION => {
            let count = c.read_u32_leb128()? as usize;
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                let idx = FuncIdx::from_u32(c.read_u32_leb128()?);
                let name = String::from(c.read_str()?);
                out.push((idx, name));
            }
            names.function_names = out;
        }
        SUBSECTION_LOCAL => {
            let func_count = c.read_u32_leb128()? as usize;
            let mut out = Vec::with_capacity(func_count);
            for _ in 0..func_count {
                let func = FuncIdx::from_u32(c.read_u32_leb128()?);
                let local_count = c.read_u32_leb128()? as usize;
                let mut locals = Vec::with_capacity(local_count);
                for _ in 0..local_count {
                    let idx = LocalIdx::from_u32(c.read_u32_leb128()?);
                    let name = String::from(c.read_str()?);
                    locals.push((idx, name));
                }
                out.push((func, locals));
            }
            names.local_names = out;
        }
        // Unknown subsection ids are simply ignored, matching the format's
        // forward-compatibility story for subsections this codec doesn't
        // know about yet.
        _ => {}
    }
    Ok(())
}

fn write_u32_leb128(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32_leb128(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn write_subsection(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    write_u32_leb128(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

/// Encode [`ModuleNames`] back into a `name` custom section's payload.
/// Iteration is in index order, matching the encoder's general
/// canonical-order convention.
pub fn encode_name_section(names: &ModuleNames) -> Vec<u8> {
    let mut out = Vec::new();

    if let Some(module_name) = &names.module_name {
        let mut payload = Vec::new();
        write_str(&mut payload, module_name);
        write_subsection(&mut out, SUBSECTION_MODULE, &payload);
    }

    if !names.function_names.is_empty() {
        let mut sorted = names.function_names.clone();
        sorted.sort_by_key(|(idx, _)| idx.as_u32());
        let mut payload = Vec::new();
        write_u32_leb128(&mut payload, sorted.len() as u32);
        for (idx, name) in &sorted {
            write_u32_leb128(&mut payload, idx.as_u32());
            write_str(&mut payload, name);
        }
        write_subsection(&mut out, SUBSECTION_FUNCTION, &payload);
    }

    if !names.local_names.is_empty() {
        let mut sorted = names.local_names.clone();
        sorted.sort_by_key(|(idx, _)| idx.as_u32());
        let mut payload = Vec::new();
        write_u32_leb128(&mut payload, sorted.len() as u32);
        for (func, locals) in &sorted {
            write_u32_leb128(&mut payload, func.as_u32());
            let mut locals = locals.clone();
            locals.sort_by_key(|(idx, _)| idx.as_u32());
            write_u32_leb128(&mut payload, locals.len() as u32);
            for (idx, name) in &locals {
                write_u32_leb128(&mut payload, idx.as_u32());
                write_str(&mut payload, name);
            }
        }
        write_subsection(&mut out, SUBSECTION_LOCAL, &payload);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_function_and_local_names() {
        let mut names = ModuleNames::default();
        names.module_name = Some(String::from("m"));
        names.function_names.push((FuncIdx::from_u32(0), String::from("main")));
        names
            .local_names
            .push((FuncIdx::from_u32(0), alloc::vec![(LocalIdx::from_u32(0), String::from("x"))]));

        let bytes = encode_name_section(&names);
        let decoded = decode_name_section(&bytes).unwrap();
        assert_eq!(decoded, names);
    }

    #[test]
    fn empty_names_encode_to_nothing() {
        let names = ModuleNames::default();
        assert!(encode_name_section(&names).is_empty());
    }

    #[test]
    fn unknown_subsection_ids_are_ignored() {
        let mut bytes = Vec::new();
        write_subsection(&mut bytes, 99, &[1, 2, 3]);
        let decoded = decode_name_section(&bytes).unwrap();
        assert_eq!(decoded, ModuleNames::default());
    }

    #[test]
    fn malformed_subsection_is_skipped_not_fatal() {
        // function-names subsection claiming count 5 but with no payload.
        let mut bytes = Vec::new();
        write_subsection(&mut bytes, SUBSECTION_FUNCTION, &[5]);
        // followed by a valid module-name subsection.
        let mut payload = Vec::new();
        write_str(&mut payload, "ok");
        write_subsection(&mut bytes, SUBSECTION_MODULE, &payload);

        let decoded = decode_name_section(&bytes).unwrap();
        assert!(decoded.function_names.is_empty());
        assert_eq!(decoded.module_name.as_deref(), Some("ok"));
    }
}
