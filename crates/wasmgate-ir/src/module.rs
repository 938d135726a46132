//! The in-memory module representation every stage of the pipeline reads or
//! produces: the decoder and the WAST parser both build one, the validator
//! reads one, and the encoder and WAST printer both consume one.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::indices::{DataIdx, ElemIdx, FuncIdx, GlobalIdx, LocalIdx, MemIdx, TableIdx, TypeIdx};
use crate::ops::Instruction;
use wasmgate_types::{FunctionType, GlobalType, MemoryType, TableType};

/// A restricted, self-evaluating operator sequence used to initialize
/// globals and segment bases.
///
/// Unlike function bodies (kept as a byte range into a shared buffer per the
/// "don't build a parallel AST" design note) initializer expressions are at
/// most a couple of operators long, so they are stored pre-decoded. The
/// instructions a constant expression may legally contain are restricted to
/// `{i32,i64,f32,f64}.const` and `global.get` of an imported immutable
/// global; the validator enforces this, not the type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstExpr {
    pub instructions: Vec<Instruction>,
}

impl ConstExpr {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Func(TypeIdx),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDesc {
    Func(FuncIdx),
    Table(TableIdx),
    Memory(MemIdx),
    Global(GlobalIdx),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// A function definition. The body is a `(offset, len)` range into the
/// module's shared `code` buffer rather than an owned `Vec<Instruction>`:
/// the validator and the printer both re-walk the raw bytes on demand
/// instead of materializing a parallel AST, matching the source
/// representation this pipeline was modeled on.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub type_idx: TypeIdx,
    pub locals: Vec<wasmgate_types::ValueType>,
    pub code_offset: u32,
    pub code_len: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub memory: MemIdx,
    pub offset: ConstExpr,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSegment {
    pub table: TableIdx,
    pub offset: ConstExpr,
    pub funcs: Vec<FuncIdx>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSection {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Disassembly names: an optional custom section mapping indices back to
/// the identifiers a WAST source used, or that a producer wants to retain
/// for human-readable disassembly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleNames {
    pub module_name: Option<String>,
    pub function_names: Vec<(FuncIdx, String)>,
    pub local_names: Vec<(FuncIdx, Vec<(LocalIdx, String)>)>,
}

/// The module: one coherent representation shared by every pipeline stage.
///
/// Index spaces are implicit in vector position, with imports preceding
/// definitions in declaration order as required by the data model: looking
/// up, say, function `i` means checking `i < imports.len()` (counting only
/// function imports) before indexing into `funcs`. [`Module::function_type`]
/// and friends perform that combination.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    pub funcs: Vec<FunctionDef>,
    pub tables: Vec<TableType>,
    pub mems: Vec<MemoryType>,
    pub globals: Vec<GlobalDef>,
    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub data_count: Option<u32>,
    pub user_sections: Vec<UserSection>,
    pub names: Option<ModuleNames>,
    /// Shared byte buffer every [`FunctionDef`]'s code range points into.
    pub code: Vec<u8>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn imported_funcs(&self) -> impl Iterator<Item = (FuncIdx, TypeIdx)> + '_ {
        self.imports.iter().enumerate().filter_map(|(i, imp)| match imp.desc {
            ImportDesc::Func(ty) => Some((FuncIdx::from_u32(i as u32), ty)),
            _ => None,
        })
    }

    pub fn num_imported_funcs(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Func(_)))
            .count()
    }

    pub fn num_imported_tables(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Table(_)))
            .count()
    }

    pub fn num_imported_mems(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Memory(_)))
            .count()
    }

    pub fn num_imported_globals(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Global(_)))
            .count()
    }

    /// Total number of functions across both index-space halves.
    pub fn total_funcs(&self) -> usize {
        self.num_imported_funcs() + self.funcs.len()
    }

    pub fn total_tables(&self) -> usize {
        self.num_imported_tables() + self.tables.len()
    }

    pub fn total_mems(&self) -> usize {
        self.num_imported_mems() + self.mems.len()
    }

    pub fn total_globals(&self) -> usize {
        self.num_imported_globals() + self.globals.len()
    }

    /// The type index of function `idx`, whether imported or defined.
    pub fn func_type_idx(&self, idx: FuncIdx) -> Option<TypeIdx> {
        let raw = idx.as_u32() as usize;
        let imported = self.num_imported_funcs();
        if raw < imported {
            self.imports.iter().filter_map(|i| match i.desc {
                ImportDesc::Func(ty) => Some(ty),
                _ => None,
            }).nth(raw)
        } else {
            self.funcs.get(raw - imported).map(|f| f.type_idx)
        }
    }

    pub fn func_type(&self, idx: FuncIdx) -> Option<&FunctionType> {
        self.func_type_idx(idx).and_then(|t| self.types.get(t.as_u32() as usize))
    }

    /// The declared table type of table `idx`, whether imported or defined.
    pub fn table_type(&self, idx: TableIdx) -> Option<&TableType> {
        let raw = idx.as_u32() as usize;
        let imported = self.num_imported_tables();
        if raw < imported {
            self.imports
                .iter()
                .filter_map(|i| match &i.desc {
                    ImportDesc::Table(t) => Some(t),
                    _ => None,
                })
                .nth(raw)
        } else {
            self.tables.get(raw - imported)
        }
    }

    pub fn mem_type(&self, idx: MemIdx) -> Option<&MemoryType> {
        let raw = idx.as_u32() as usize;
        let imported = self.num_imported_mems();
        if raw < imported {
            self.imports
                .iter()
                .filter_map(|i| match &i.desc {
                    ImportDesc::Memory(t) => Some(t),
                    _ => None,
                })
                .nth(raw)
        } else {
            self.mems.get(raw - imported)
        }
    }

    pub fn global_type(&self, idx: GlobalIdx) -> Option<GlobalType> {
        let raw = idx.as_u32() as usize;
        let imported = self.num_imported_globals();
        if raw < imported {
            self.imports
                .iter()
                .filter_map(|i| match &i.desc {
                    ImportDesc::Global(t) => Some(*t),
                    _ => None,
                })
                .nth(raw)
        } else {
            self.globals.get(raw - imported).map(|g| g.ty)
        }
    }

    /// Whether `idx` names an imported (rather than locally defined) global.
    pub fn is_global_imported(&self, idx: GlobalIdx) -> bool {
        (idx.as_u32() as usize) < self.num_imported_globals()
    }

    /// The raw operator bytes for a function body, for the validator and
    /// printer to decode on demand.
    pub fn function_body_bytes(&self, def: &FunctionDef) -> &[u8] {
        let start = def.code_offset as usize;
        let end = start + def.code_len as usize;
        &self.code[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmgate_types::{Mutability, ResultType, ValueType};

    #[test]
    fn index_space_combines_imports_then_definitions() {
        let mut module = Module::new();
        module.types.push(FunctionType::new(Vec::new(), ResultType::None));
        module.imports.push(Import {
            module: "env".into(),
            name: "f".into(),
            desc: ImportDesc::Func(TypeIdx::from_u32(0)),
        });
        module.funcs.push(FunctionDef {
            type_idx: TypeIdx::from_u32(0),
            locals: Vec::new(),
            code_offset: 0,
            code_len: 0,
        });

        assert_eq!(module.total_funcs(), 2);
        assert_eq!(module.func_type_idx(FuncIdx::from_u32(0)), Some(TypeIdx::from_u32(0)));
        assert_eq!(module.func_type_idx(FuncIdx::from_u32(1)), Some(TypeIdx::from_u32(0)));
    }

    #[test]
    fn global_import_detection() {
        let mut module = Module::new();
        module.imports.push(Import {
            module: "env".into(),
            name: "g".into(),
            desc: ImportDesc::Global(GlobalType {
                value: ValueType::I32,
                mutability: Mutability::Const,
            }),
        });
        assert!(module.is_global_imported(GlobalIdx::from_u32(0)));
        assert!(!module.is_global_imported(GlobalIdx::from_u32(1)));
    }
}
