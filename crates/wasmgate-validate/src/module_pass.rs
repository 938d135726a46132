//! The declarative pass over the whole module: index ranges, cardinality
//! limits, export uniqueness, the start function's signature, and
//! initializer expressions for globals, data, and element segments. None of
//! this looks inside a function body; that is the body pass's job.

extern crate alloc;

use alloc::vec::Vec;

use hashbrown::HashSet;
use wasmgate_ir::{ConstExpr, Instruction, Module};
use wasmgate_types::{Mutability, ResultType, ValueType};

use crate::error::{Error, IndexKind};

/// Bytes per memory page, per the format's fixed page size.
const MEMORY_PAGE_SIZE: i64 = 65536;

pub fn validate_module(module: &Module, errors: &mut Vec<Error>) {
    check_cardinality(module, errors);
    check_imports(module, errors);
    check_start(module, errors);
    check_exports(module, errors);
    check_globals(module, errors);
    check_elements(module, errors);
    check_data(module, errors);
}

/// Imported function types never go through the body pass (there's no body
/// to walk), so their type index has to be range-checked here instead of
/// lazily via `Module::func_type` the way a definition's is.
fn check_imports(module: &Module, errors: &mut Vec<Error>) {
    for import in &module.imports {
        if let wasmgate_ir::ImportDesc::Func(ty) = &import.desc {
            if (ty.as_u32() as usize) >= module.types.len() {
                errors.push(Error::BadIndex {
                    kind: IndexKind::Type,
                    index: ty.as_u32(),
                });
            }
        }
    }
}

fn check_cardinality(module: &Module, errors: &mut Vec<Error>) {
    if module.total_mems() > 1 {
        errors.push(Error::TooManyMemories);
    }
    if module.total_tables() > 1 {
        errors.push(Error::TooManyTables);
    }
}

fn check_start(module: &Module, errors: &mut Vec<Error>) {
    let Some(start) = module.start else { return };
    match module.func_type(start) {
        None => errors.push(Error::BadIndex {
            kind: IndexKind::Func,
            index: start.as_u32(),
        }),
        Some(ty) => {
            if !ty.params().is_empty() || ty.result() != ResultType::None {
                errors.push(Error::StartFunctionNotNullary);
            }
        }
    }
}

fn check_exports(module: &Module, errors: &mut Vec<Error>) {
    let mut names = HashSet::new();
    for export in &module.exports {
        if !names.insert(export.name.as_str()) {
            errors.push(Error::DuplicateExportName {
                name: export.name.clone(),
            });
        }
        use wasmgate_ir::ExportDesc::*;
        let in_range = match export.desc {
            Func(i) => (i.as_u32() as usize) < module.total_funcs(),
            Table(i) => (i.as_u32() as usize) < module.total_tables(),
            Memory(i) => (i.as_u32() as usize) < module.total_mems(),
            Global(i) => (i.as_u32() as usize) < module.total_globals(),
        };
        if !in_range {
            let (kind, index) = match export.desc {
                Func(i) => (IndexKind::Func, i.as_u32()),
                Table(i) => (IndexKind::Table, i.as_u32()),
                Memory(i) => (IndexKind::Memory, i.as_u32()),
                Global(i) => (IndexKind::Global, i.as_u32()),
            };
            errors.push(Error::BadIndex { kind, index });
        }
    }
}

/// A constant expression's value type and, if it reduces to a literal
/// integer, that literal (needed by segment-overlap checks). Returns `None`
/// when the expression isn't a single recognized constant form (the caller
/// is responsible for raising [`Error::BadConstExpr`]).
fn const_expr_type(module: &Module, expr: &ConstExpr) -> Option<(ValueType, Option<i64>)> {
    let [instr] = expr.instructions.as_slice() else {
        return None;
    };
    Some(match instr {
        Instruction::I32Const { value } => (ValueType::I32, Some(*value as i64)),
        Instruction::I64Const { value } => (ValueType::I64, Some(*value)),
        Instruction::F32Const { .. } => (ValueType::F32, None),
        Instruction::F64Const { .. } => (ValueType::F64, None),
        Instruction::GlobalGet { global } => {
            let ty = module.global_type(*global)?;
            if module.is_global_imported(*global) && ty.mutability == Mutability::Const {
                (ty.value, None)
            } else {
                return None;
            }
        }
        _ => return None,
    })
}

fn check_const_expr(module: &Module, expr: &ConstExpr, expected: ValueType, errors: &mut Vec<Error>) {
    match const_expr_type(module, expr) {
        None => errors.push(Error::BadConstExpr),
        Some((actual, _)) if actual != expected => {
            errors.push(Error::ConstExprTypeMismatch { expected, actual })
        }
        Some(_) => {}
    }
}

fn check_globals(module: &Module, errors: &mut Vec<Error>) {
    for import in &module.imports {
        if let wasmgate_ir::ImportDesc::Global(ty) = &import.desc {
            if ty.mutability == Mutability::Var {
                errors.push(Error::MutableGlobalImported);
            }
        }
    }
    for global in &module.globals {
        check_const_expr(module, &global.init, global.ty.value, errors);
    }
}

/// Finds pairwise overlaps among segments whose base offset is a constant
/// `i32.const` literal (the only case where overlap is statically knowable;
/// an imported-global base is left to the host to check at instantiation).
fn overlapping_ranges(bases: &[(usize, i64, usize)]) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    for i in 0..bases.len() {
        for j in (i + 1)..bases.len() {
            let (idx_a, base_a, len_a) = bases[i];
            let (idx_b, base_b, len_b) = bases[j];
            let (start_a, end_a) = (base_a, base_a + len_a as i64);
            let (start_b, end_b) = (base_b, base_b + len_b as i64);
            if start_a < end_b && start_b < end_a {
                out.push((idx_a as u32, idx_b as u32));
            }
        }
    }
    out
}

fn check_elements(module: &Module, errors: &mut Vec<Error>) {
    let mut bases = Vec::new();
    for (i, elem) in module.elements.iter().enumerate() {
        if (elem.table.as_u32() as usize) >= module.total_tables() {
            errors.push(Error::BadIndex {
                kind: IndexKind::Table,
                index: elem.table.as_u32(),
            });
            continue;
        }
        check_const_expr(module, &elem.offset, ValueType::I32, errors);
        for func in &elem.funcs {
            if (func.as_u32() as usize) >= module.total_funcs() {
                errors.push(Error::BadIndex {
                    kind: IndexKind::Func,
                    index: func.as_u32(),
                });
            }
        }
        if let Some((_, Some(base))) = const_expr_type(module, &elem.offset) {
            if let Some(table_ty) = module.table_type(elem.table) {
                let min_end = base + elem.funcs.len() as i64;
                if base < 0 || min_end > table_ty.limits.min as i64 {
                    errors.push(Error::ElementSegmentOutOfRange {
                        segment: i as u32,
                        table: elem.table.as_u32(),
                    });
                }
            }
            bases.push((i, base, elem.funcs.len()));
        }
    }
    for (a, b) in overlapping_ranges(&bases) {
        errors.push(Error::OverlappingElementSegments { a, b });
    }
}

fn check_data(module: &Module, errors: &mut Vec<Error>) {
    let mut bases = Vec::new();
    for (i, data) in module.data.iter().enumerate() {
        if (data.memory.as_u32() as usize) >= module.total_mems() {
            errors.push(Error::BadIndex {
                kind: IndexKind::Memory,
                index: data.memory.as_u32(),
            });
            continue;
        }
        check_const_expr(module, &data.offset, ValueType::I32, errors);
        if let Some((_, Some(base))) = const_expr_type(module, &data.offset) {
            if let Some(mem_ty) = module.mem_type(data.memory) {
                let min_end = base + data.bytes.len() as i64;
                let min_bytes = mem_ty.limits.min as i64 * MEMORY_PAGE_SIZE;
                if base < 0 || min_end > min_bytes {
                    errors.push(Error::DataSegmentOutOfRange {
                        segment: i as u32,
                        mem: data.memory.as_u32(),
                    });
                }
            }
            bases.push((i, base, data.bytes.len()));
        }
    }
    for (a, b) in overlapping_ranges(&bases) {
        errors.push(Error::OverlappingDataSegments { a, b });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmgate_ir::{DataSegment, FunctionDef, GlobalDef, Import, ImportDesc, MemIdx, TypeIdx};
    use wasmgate_types::{FunctionType, GlobalType, MemoryType, SizeConstraint};

    fn nullary_module() -> Module {
        let mut m = Module::new();
        m.types.push(FunctionType::new(Vec::new(), ResultType::None));
        m
    }

    #[test]
    fn start_function_must_be_nullary() {
        let mut m = nullary_module();
        m.types.push(FunctionType::new(
            alloc::vec![ValueType::I32],
            ResultType::None,
        ));
        m.funcs.push(FunctionDef {
            type_idx: TypeIdx::from_u32(1),
            locals: Vec::new(),
            code_offset: 0,
            code_len: 0,
        });
        m.start = Some(wasmgate_ir::FuncIdx::from_u32(0));

        let mut errors = Vec::new();
        validate_module(&m, &mut errors);
        assert!(matches!(errors[0], Error::StartFunctionNotNullary));
    }

    #[test]
    fn duplicate_export_names_are_rejected() {
        let mut m = nullary_module();
        m.funcs.push(FunctionDef {
            type_idx: TypeIdx::from_u32(0),
            locals: Vec::new(),
            code_offset: 0,
            code_len: 0,
        });
        m.exports.push(wasmgate_ir::Export {
            name: "f".into(),
            desc: wasmgate_ir::ExportDesc::Func(wasmgate_ir::FuncIdx::from_u32(0)),
        });
        m.exports.push(wasmgate_ir::Export {
            name: "f".into(),
            desc: wasmgate_ir::ExportDesc::Func(wasmgate_ir::FuncIdx::from_u32(0)),
        });

        let mut errors = Vec::new();
        validate_module(&m, &mut errors);
        assert!(matches!(errors[0], Error::DuplicateExportName { .. }));
    }

    #[test]
    fn imported_function_with_out_of_range_type_is_rejected() {
        let mut m = nullary_module();
        m.imports.push(Import {
            module: "env".into(),
            name: "f".into(),
            desc: ImportDesc::Func(TypeIdx::from_u32(99)),
        });

        let mut errors = Vec::new();
        validate_module(&m, &mut errors);
        assert!(matches!(
            errors[0],
            Error::BadIndex {
                kind: IndexKind::Type,
                index: 99
            }
        ));
    }

    #[test]
    fn mutable_global_import_is_rejected_by_default() {
        let mut m = nullary_module();
        m.imports.push(Import {
            module: "env".into(),
            name: "g".into(),
            desc: ImportDesc::Global(GlobalType {
                value: ValueType::I32,
                mutability: Mutability::Var,
            }),
        });

        let mut errors = Vec::new();
        validate_module(&m, &mut errors);
        assert!(matches!(errors[0], Error::MutableGlobalImported));
    }

    #[test]
    fn global_initializer_type_mismatch_is_detected() {
        let mut m = nullary_module();
        m.globals.push(GlobalDef {
            ty: GlobalType {
                value: ValueType::F64,
                mutability: Mutability::Const,
            },
            init: ConstExpr::new(alloc::vec![Instruction::I32Const { value: 1 }]),
        });

        let mut errors = Vec::new();
        validate_module(&m, &mut errors);
        assert!(matches!(errors[0], Error::ConstExprTypeMismatch { .. }));
    }

    #[test]
    fn data_segment_past_memory_minimum_is_rejected() {
        let mut m = nullary_module();
        m.mems.push(MemoryType {
            limits: SizeConstraint::new(1, None),
        });
        m.data.push(DataSegment {
            memory: MemIdx::from_u32(0),
            offset: ConstExpr::new(alloc::vec![Instruction::I32Const {
                value: 70_000
            }]),
            bytes: alloc::vec![1, 2, 3],
        });

        let mut errors = Vec::new();
        validate_module(&m, &mut errors);
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::DataSegmentOutOfRange { .. })));
    }

    #[test]
    fn overlapping_data_segments_are_rejected() {
        let mut m = nullary_module();
        m.mems.push(MemoryType {
            limits: SizeConstraint::new(2, None),
        });
        m.data.push(DataSegment {
            memory: MemIdx::from_u32(0),
            offset: ConstExpr::new(alloc::vec![Instruction::I32Const { value: 0 }]),
            bytes: alloc::vec![0; 10],
        });
        m.data.push(DataSegment {
            memory: MemIdx::from_u32(0),
            offset: ConstExpr::new(alloc::vec![Instruction::I32Const { value: 5 }]),
            bytes: alloc::vec![0; 10],
        });

        let mut errors = Vec::new();
        validate_module(&m, &mut errors);
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::OverlappingDataSegments { .. })));
    }
}
