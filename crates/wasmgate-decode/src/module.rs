//! Top-level module framing: magic/version header, then the fixed section
//! sequence, decoded directly into an owned [`wasmgate_ir::Module`].

extern crate alloc;
use alloc::vec::Vec;

use crate::binary_reader::BinaryReader;
use crate::error::{Error, Result};
use crate::limits::*;
use wasmgate_ir::{
    DataSegment, ElementSegment, Export, ExportDesc, FunctionDef, GlobalDef, Import, ImportDesc,
    Module, ModuleNames, UserSection,
};
use wasmgate_types::FunctionType;

const MAGIC: [u8; 4] = *b"\0asm";
const VERSION: u32 = 1;

/// Known section ids. The wire tag (assigned as each variant's discriminant)
/// is not monotonic with stream order: `DataCount`'s wire tag is 12, but it
/// is required to appear *before* `Code` (tag 10). Ordering is checked
/// via [`SectionId::stream_rank`], never by comparing the enum directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SectionId {
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

impl SectionId {
    /// Position in the fixed stream order the format requires.
    fn stream_rank(self) -> u8 {
        match self {
            SectionId::Type => 0,
            SectionId::Import => 1,
            SectionId::Function => 2,
            SectionId::Table => 3,
            SectionId::Memory => 4,
            SectionId::Global => 5,
            SectionId::Export => 6,
            SectionId::Start => 7,
            SectionId::Element => 8,
            SectionId::DataCount => 9,
            SectionId::Code => 10,
            SectionId::Data => 11,
        }
    }
}

fn known_section_id(tag: u8) -> Option<SectionId> {
    Some(match tag {
        1 => SectionId::Type,
        2 => SectionId::Import,
        3 => SectionId::Function,
        4 => SectionId::Table,
        5 => SectionId::Memory,
        6 => SectionId::Global,
        7 => SectionId::Export,
        8 => SectionId::Start,
        9 => SectionId::Element,
        10 => SectionId::Code,
        11 => SectionId::Data,
        12 => SectionId::DataCount,
        _ => return None,
    })
}

/// Decode a complete module. Fails fast on the first malformed byte; the
/// one leniency is the name section, whose malformed subsections are
/// dropped with a debug-log entry rather than failing the module.
pub fn decode_module(bytes: &[u8]) -> Result<Module> {
    let mut r = BinaryReader::new(bytes);
    let magic = r.read_bytes(4)?;
    if magic != MAGIC {
        return Err(Error::InvalidMagicNumber);
    }
    let version = u32::from_le_bytes(r.read_bytes(4)?.try_into().unwrap());
    if version != VERSION {
        return Err(Error::UnsupportedVersion);
    }

    let mut module = Module::new();
    let mut func_type_indices = Vec::new();
    let mut last_known: Option<SectionId> = None;

    while !r.eof() {
        let section_start = r.pos;
        let id = r.read_u8()?;
        let payload_len = r.read_u32_leb128()? as usize;
        let payload_start = r.pos;
        let payload = r.read_bytes(payload_len)?;
        let mut sr = BinaryReader::at_offset(payload, 0);

        if id == 0 {
            decode_custom_section(&mut sr, &mut module)?;
            continue;
        }

        let kind = known_section_id(id).ok_or(Error::UnknownSectionId {
            id,
            offset: section_start,
        })?;
        if let Some(last) = last_known {
            if kind.stream_rank() <= last.stream_rank() {
                return Err(Error::SectionOutOfOrder { offset: section_start });
            }
        }
        last_known = Some(kind);

        match kind {
            SectionId::Type => decode_type_section(&mut sr, &mut module)?,
            SectionId::Import => decode_import_section(&mut sr, &mut module)?,
            SectionId::Function => decode_function_section(&mut sr, &mut func_type_indices)?,
            SectionId::Table => decode_table_section(&mut sr, &mut module)?,
            SectionId::Memory => decode_memory_section(&mut sr, &mut module)?,
            SectionId::Global => decode_global_section(&mut sr, &mut module)?,
            SectionId::Export => decode_export_section(&mut sr, &mut module)?,
            SectionId::Start => {
                if module.start.is_some() {
                    return Err(Error::MultipleStartSections);
                }
                module.start = Some(sr.read_func_idx()?);
            }
            SectionId::Element => decode_element_section(&mut sr, &mut module)?,
            SectionId::Code => decode_code_section(&mut sr, &mut module, &func_type_indices)?,
            SectionId::Data => decode_data_section(&mut sr, &mut module)?,
            SectionId::DataCount => module.data_count = Some(sr.read_u32_leb128()?),
        }

        if sr.pos != payload.len() {
            return Err(Error::TrailingBytes {
                offset: payload_start + sr.pos,
            });
        }
    }

    if func_type_indices.len() != module.funcs.len() {
        return Err(Error::FunctionCodeCountMismatch {
            functions: func_type_indices.len(),
            codes: module.funcs.len(),
        });
    }

    Ok(module)
}

fn decode_type_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    if count > MAX_WASM_TYPES {
        return Err(Error::VectorTooLong { len: count, max: MAX_WASM_TYPES, offset: r.pos });
    }
    for _ in 0..count {
        let (params, result) = r.read_function_type_shape()?;
        module.types.push(FunctionType::new(params, result));
    }
    Ok(())
}

fn decode_import_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    for _ in 0..count {
        let module_name = r.read_name()?;
        let name = r.read_name()?;
        let offset = r.pos;
        let desc = match r.read_u8()? {
            0x00 => ImportDesc::Func(r.read_type_idx()?),
            0x01 => ImportDesc::Table(r.read_table_type()?),
            0x02 => ImportDesc::Memory(r.read_memory_type()?),
            0x03 => ImportDesc::Global(r.read_global_type()?),
            tag => return Err(Error::UnknownExternalKind { tag, offset }),
        };
        module.imports.push(Import { module: module_name, name, desc });
    }
    Ok(())
}

fn decode_function_section(r: &mut BinaryReader, out: &mut Vec<wasmgate_ir::TypeIdx>) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    if count > MAX_WASM_FUNCTIONS {
        return Err(Error::VectorTooLong { len: count, max: MAX_WASM_FUNCTIONS, offset: r.pos });
    }
    for _ in 0..count {
        out.push(r.read_type_idx()?);
    }
    Ok(())
}

fn decode_table_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    for _ in 0..count {
        module.tables.push(r.read_table_type()?);
    }
    Ok(())
}

fn decode_memory_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    for _ in 0..count {
        module.mems.push(r.read_memory_type()?);
    }
    Ok(())
}

fn decode_global_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    if count > MAX_WASM_GLOBALS {
        return Err(Error::VectorTooLong { len: count, max: MAX_WASM_GLOBALS, offset: r.pos });
    }
    for _ in 0..count {
        let ty = r.read_global_type()?;
        let init = r.read_const_expr()?;
        module.globals.push(GlobalDef { ty, init });
    }
    Ok(())
}

fn decode_export_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    if count > MAX_WASM_EXPORTS {
        return Err(Error::VectorTooLong { len: count, max: MAX_WASM_EXPORTS, offset: r.pos });
    }
    for _ in 0..count {
        let name = r.read_name()?;
        let offset = r.pos;
        let desc = match r.read_u8()? {
            0x00 => ExportDesc::Func(r.read_func_idx()?),
            0x01 => ExportDesc::Table(r.read_table_idx()?),
            0x02 => ExportDesc::Memory(r.read_mem_idx()?),
            0x03 => ExportDesc::Global(r.read_global_idx()?),
            tag => return Err(Error::UnknownExternalKind { tag, offset }),
        };
        module.exports.push(Export { name, desc });
    }
    Ok(())
}

fn decode_element_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    if count > MAX_WASM_ELEMENT_SEGMENTS {
        return Err(Error::VectorTooLong { len: count, max: MAX_WASM_ELEMENT_SEGMENTS, offset: r.pos });
    }
    for _ in 0..count {
        let table = r.read_table_idx()?;
        let offset = r.read_const_expr()?;
        let func_count = r.read_u32_leb128()? as usize;
        let mut funcs = Vec::with_capacity(func_count);
        for _ in 0..func_count {
            funcs.push(r.read_func_idx()?);
        }
        module.elements.push(ElementSegment { table, offset, funcs });
    }
    Ok(())
}

fn decode_code_section(r: &mut BinaryReader, module: &mut Module, func_types: &[wasmgate_ir::TypeIdx]) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    for i in 0..count {
        let body_len = r.read_u32_leb128()? as usize;
        if body_len > MAX_WASM_FUNCTION_SIZE {
            return Err(Error::VectorTooLong { len: body_len, max: MAX_WASM_FUNCTION_SIZE, offset: r.pos });
        }
        let body_start = r.pos;
        let body_bytes = r.read_bytes(body_len)?;
        let mut br = BinaryReader::at_offset(body_bytes, 0);

        let local_group_count = br.read_u32_leb128()? as usize;
        let mut locals = Vec::new();
        for _ in 0..local_group_count {
            let n = br.read_u32_leb128()? as usize;
            if locals.len() + n > MAX_WASM_FUNCTION_LOCALS {
                return Err(Error::VectorTooLong {
                    len: locals.len() + n,
                    max: MAX_WASM_FUNCTION_LOCALS,
                    offset: body_start + br.pos,
                });
            }
            let ty = br.read_value_type()?;
            for _ in 0..n {
                locals.push(ty);
            }
        }

        let code_offset = module.code.len() as u32;
        module.code.extend_from_slice(&body_bytes[br.pos..]);
        let code_len = module.code.len() as u32 - code_offset;

        let type_idx = *func_types.get(i).ok_or(Error::FunctionCodeCountMismatch {
            functions: func_types.len(),
            codes: count,
        })?;
        module.funcs.push(FunctionDef { type_idx, locals, code_offset, code_len });
    }
    Ok(())
}

fn decode_data_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let count = r.read_u32_leb128()? as usize;
    if count > MAX_WASM_DATA_SEGMENTS {
        return Err(Error::VectorTooLong { len: count, max: MAX_WASM_DATA_SEGMENTS, offset: r.pos });
    }
    for _ in 0..count {
        let memory = r.read_mem_idx()?;
        let offset = r.read_const_expr()?;
        let len = r.read_u32_leb128()? as usize;
        let bytes = r.read_bytes(len)?.to_vec();
        module.data.push(DataSegment { memory, offset, bytes });
    }
    Ok(())
}

fn decode_custom_section(r: &mut BinaryReader, module: &mut Module) -> Result<()> {
    let name = r.read_name()?;
    if name == "name" {
        match wasmgate_names::decode_name_section(r.remaining_bytes()) {
            Ok(names) => module.names = Some(names),
            Err(e) => {
                log::debug!("dropping malformed name section: {e}");
            }
        }
        r.pos = r.bytes.len();
        return Ok(());
    }
    let bytes = r.remaining_bytes().to_vec();
    r.pos = r.bytes.len();
    module.user_sections.push(UserSection { name, bytes });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leb(mut v: u32) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
        out
    }

    fn section(id: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = alloc::vec![id];
        out.extend(leb(payload.len() as u32));
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn decodes_minimal_identity_module() {
        let mut bytes = alloc::vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];
        // type section: one `() -> ()`
        bytes.extend(section(1, &[0x01, 0x60, 0x00, 0x00]));
        // function section: one function of type 0
        bytes.extend(section(3, &[0x01, 0x00]));
        // code section: one body, no locals, just `end`
        bytes.extend(section(10, &[0x01, 0x02, 0x00, 0x0b]));

        let module = decode_module(&bytes).unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.funcs.len(), 1);
        assert_eq!(module.function_body_bytes(&module.funcs[0]), &[0x0b]);
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(matches!(decode_module(&[1, 2, 3, 4]), Err(Error::InvalidMagicNumber) | Err(Error::UnexpectedEof { .. })));
    }
}
