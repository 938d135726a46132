//! Whole-module encoding: header, then each non-empty known section in
//! canonical order, then user sections (including a re-encoded `name`
//! section) in their original relative order.

extern crate alloc;

use alloc::vec::Vec;

use crate::writer::ByteWriter;
use wasmgate_ir::{ExportDesc, ImportDesc, Module};
use wasmgate_types::ValueType;

const MAGIC: [u8; 4] = *b"\0asm";
const VERSION: u32 = 1;

fn write_section(out: &mut Vec<u8>, id: u8, payload: &ByteWriter) {
    if payload.is_empty() && id != 0 {
        return;
    }
    out.push(id);
    let mut len = ByteWriter::new();
    len.write_u32_leb128(payload.len() as u32);
    out.extend_from_slice(&len.buf);
    out.extend_from_slice(&payload.buf);
}

/// Coalesce a flat local-type vector back into RLE `(count, type)` groups,
/// the decoder's inverse.
fn coalesce_locals(locals: &[ValueType]) -> Vec<(u32, ValueType)> {
    let mut groups: Vec<(u32, ValueType)> = Vec::new();
    for &ty in locals {
        match groups.last_mut() {
            Some((count, last_ty)) if *last_ty == ty => *count += 1,
            _ => groups.push((1, ty)),
        }
    }
    groups
}

pub fn encode_module(module: &Module) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());

    // Type section.
    {
        let mut w = ByteWriter::new();
        if !module.types.is_empty() {
            w.write_u32_leb128(module.types.len() as u32);
            for ty in &module.types {
                w.write_u8(0x60);
                w.write_u32_leb128(ty.params().len() as u32);
                for &p in ty.params() {
                    w.write_value_type(p);
                }
                w.write_result_type(ty.result());
            }
        }
        write_section(&mut out, 1, &w);
    }

    // Import section.
    {
        let mut w = ByteWriter::new();
        if !module.imports.is_empty() {
            w.write_u32_leb128(module.imports.len() as u32);
            for import in &module.imports {
                w.write_str(&import.module);
                w.write_str(&import.name);
                match &import.desc {
                    ImportDesc::Func(ty) => {
                        w.write_u8(0x00);
                        w.write_u32_leb128(ty.as_u32());
                    }
                    ImportDesc::Table(ty) => {
                        w.write_u8(0x01);
                        w.write_table_type(ty);
                    }
                    ImportDesc::Memory(ty) => {
                        w.write_u8(0x02);
                        w.write_memory_type(ty);
                    }
                    ImportDesc::Global(ty) => {
                        w.write_u8(0x03);
                        w.write_global_type(*ty);
                    }
                }
            }
        }
        write_section(&mut out, 2, &w);
    }

    // Function section.
    {
        let mut w = ByteWriter::new();
        if !module.funcs.is_empty() {
            w.write_u32_leb128(module.funcs.len() as u32);
            for f in &module.funcs {
                w.write_u32_leb128(f.type_idx.as_u32());
            }
        }
        write_section(&mut out, 3, &w);
    }

    // Table section.
    {
        let mut w = ByteWriter::new();
        if !module.tables.is_empty() {
            w.write_u32_leb128(module.tables.len() as u32);
            for t in &module.tables {
                w.write_table_type(t);
            }
        }
        write_section(&mut out, 4, &w);
    }

    // Memory section.
    {
        let mut w = ByteWriter::new();
        if !module.mems.is_empty() {
            w.write_u32_leb128(module.mems.len() as u32);
            for m in &module.mems {
                w.write_memory_type(m);
            }
        }
        write_section(&mut out, 5, &w);
    }

    // Global section.
    {
        let mut w = ByteWriter::new();
        if !module.globals.is_empty() {
            w.write_u32_leb128(module.globals.len() as u32);
            for g in &module.globals {
                w.write_global_type(g.ty);
                write_const_expr(&mut w, &g.init);
            }
        }
        write_section(&mut out, 6, &w);
    }

    // Export section.
    {
        let mut w = ByteWriter::new();
        if !module.exports.is_empty() {
            w.write_u32_leb128(module.exports.len() as u32);
            for e in &module.exports {
                w.write_str(&e.name);
                match e.desc {
                    ExportDesc::Func(i) => {
                        w.write_u8(0x00);
                        w.write_u32_leb128(i.as_u32());
                    }
                    ExportDesc::Table(i) => {
                        w.write_u8(0x01);
                        w.write_u32_leb128(i.as_u32());
                    }
                    ExportDesc::Memory(i) => {
                        w.write_u8(0x02);
                        w.write_u32_leb128(i.as_u32());
                    }
                    ExportDesc::Global(i) => {
                        w.write_u8(0x03);
                        w.write_u32_leb128(i.as_u32());
                    }
                }
            }
        }
        write_section(&mut out, 7, &w);
    }

    // Start section.
    if let Some(start) = module.start {
        let mut w = ByteWriter::new();
        w.write_u32_leb128(start.as_u32());
        write_section(&mut out, 8, &w);
    }

    // Element section.
    {
        let mut w = ByteWriter::new();
        if !module.elements.is_empty() {
            w.write_u32_leb128(module.elements.len() as u32);
            for e in &module.elements {
                w.write_u32_leb128(e.table.as_u32());
                write_const_expr(&mut w, &e.offset);
                w.write_u32_leb128(e.funcs.len() as u32);
                for f in &e.funcs {
                    w.write_u32_leb128(f.as_u32());
                }
            }
        }
        write_section(&mut out, 9, &w);
    }

    // DataCount section: written before Code per the format's stream order,
    // even though its wire tag (12) sorts after Code's (10).
    if let Some(count) = module.data_count {
        let mut w = ByteWriter::new();
        w.write_u32_leb128(count);
        write_section(&mut out, 12, &w);
    }

    // Code section.
    {
        let mut w = ByteWriter::new();
        if !module.funcs.is_empty() {
            w.write_u32_leb128(module.funcs.len() as u32);
            for f in &module.funcs {
                let groups = coalesce_locals(&f.locals);
                let mut body = ByteWriter::new();
                body.write_u32_leb128(groups.len() as u32);
                for (count, ty) in groups {
                    body.write_u32_leb128(count);
                    body.write_value_type(ty);
                }
                body.write_bytes(module.function_body_bytes(f));
                w.write_u32_leb128(body.len() as u32);
                w.write_bytes(&body.buf);
            }
        }
        write_section(&mut out, 10, &w);
    }

    // Data section.
    {
        let mut w = ByteWriter::new();
        if !module.data.is_empty() {
            w.write_u32_leb128(module.data.len() as u32);
            for d in &module.data {
                w.write_u32_leb128(d.memory.as_u32());
                write_const_expr(&mut w, &d.offset);
                w.write_u32_leb128(d.bytes.len() as u32);
                w.write_bytes(&d.bytes);
            }
        }
        write_section(&mut out, 11, &w);
    }

    // User sections, in their original relative order. A structured
    // `ModuleNames` (if present) is re-encoded and emitted as the `name`
    // section alongside whatever other custom sections were retained
    // verbatim.
    for user in &module.user_sections {
        let mut w = ByteWriter::new();
        w.write_str(&user.name);
        w.write_bytes(&user.bytes);
        write_section(&mut out, 0, &w);
    }
    if let Some(names) = &module.names {
        let mut w = ByteWriter::new();
        w.write_str("name");
        w.write_bytes(&wasmgate_names::encode_name_section(names));
        write_section(&mut out, 0, &w);
    }

    out
}

fn write_const_expr(w: &mut ByteWriter, expr: &wasmgate_ir::ConstExpr) {
    for instr in &expr.instructions {
        w.write_instruction(instr);
    }
    w.write_instruction(&wasmgate_ir::Instruction::End);
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmgate_decode::decode_module;
    use wasmgate_ir::{ConstExpr, FunctionDef, Instruction, TypeIdx};
    use wasmgate_types::{FunctionType, ResultType};

    #[test]
    fn minimal_identity_round_trips() {
        let mut module = Module::new();
        module.types.push(FunctionType::new(Vec::new(), ResultType::None));
        module.funcs.push(FunctionDef {
            type_idx: TypeIdx::from_u32(0),
            locals: Vec::new(),
            code_offset: 0,
            code_len: 1,
        });
        module.code.push(0x0b);

        let bytes = encode_module(&module);
        let decoded = decode_module(&bytes).unwrap();
        assert_eq!(decoded.types, module.types);
        assert_eq!(decoded.funcs, module.funcs);
        assert_eq!(decoded.function_body_bytes(&decoded.funcs[0]), &[0x0b]);
    }

    #[test]
    fn const_plus_return_matches_spec_bytes() {
        let mut module = Module::new();
        module
            .types
            .push(FunctionType::new(Vec::new(), ResultType::Value(ValueType::I32)));
        let code = alloc::vec![0x41, 0x2a, 0x0b];
        module.code.extend_from_slice(&code);
        module.funcs.push(FunctionDef {
            type_idx: TypeIdx::from_u32(0),
            locals: Vec::new(),
            code_offset: 0,
            code_len: code.len() as u32,
        });

        let bytes = encode_module(&module);
        let decoded = decode_module(&bytes).unwrap();
        assert_eq!(decoded.function_body_bytes(&decoded.funcs[0]), &[0x41, 0x2a, 0x0b]);
    }

    #[test]
    fn local_groups_coalesce_consecutive_identical_types() {
        let locals = alloc::vec![ValueType::I32, ValueType::I32, ValueType::F64];
        let groups = coalesce_locals(&locals);
        assert_eq!(groups, alloc::vec![(2, ValueType::I32), (1, ValueType::F64)]);
    }

    #[test]
    fn const_expr_with_global_get_round_trips() {
        let mut module = Module::new();
        module.types.push(FunctionType::new(Vec::new(), ResultType::None));
        module.imports.push(wasmgate_ir::Import {
            module: "env".into(),
            name: "g".into(),
            desc: ImportDesc::Global(wasmgate_types::GlobalType {
                value: ValueType::I32,
                mutability: wasmgate_types::Mutability::Const,
            }),
        });
        module.globals.push(wasmgate_ir::GlobalDef {
            ty: wasmgate_types::GlobalType {
                value: ValueType::I32,
                mutability: wasmgate_types::Mutability::Const,
            },
            init: ConstExpr::new(alloc::vec![Instruction::GlobalGet {
                global: wasmgate_ir::GlobalIdx::from_u32(0)
            }]),
        });

        let bytes = encode_module(&module);
        let decoded = decode_module(&bytes).unwrap();
        assert_eq!(decoded.globals, module.globals);
    }
}
