//! Lowers a parsed s-expression tree into a [`wasmgate_ir::Module`].
//!
//! Two passes over the `(module ...)` form's top-level children (deinline
//! inline import/export forms, resolve names, lower to bytes), via a
//! hand-written recursive descent over the explicit [`Sexpr`] tree rather
//! than a generic `Parse`/`Peek` combinator framework:
//!
//! - **Declarations**: walk the children once per index space, in two
//!   sub-passes each (imports first, then definitions; the binary index
//!   space always numbers every import of a kind before any definition of
//!   that kind, regardless of their relative order in the source). Inline
//!   `(import ...)`/`(export ...)` forms attached to `func`/`table`/
//!   `memory`/`global` are "deinlined" in the same sweep as their standalone
//!   counterparts, rather than as a separate AST rewrite pass, since this
//!   parser has no reusable AST to rewrite in place.
//! - **Definitions**: for each function, parse params/locals/body against
//!   the name maps built above; for each global/elem/data, parse its
//!   initializer expression the same way; for each standalone `export`/
//!   `start`, resolve its reference.
//!
//! Only the "folded" s-expression form is accepted: every operator is its
//! own parenthesized list (or a bare keyword atom when it has no
//! immediates), and `block`/`loop`/`if` take their nested body as sibling
//! forms with no explicit closing `end` keyword in the source (the closing
//! paren supplies it). The unfolded flat-token form real `.wat` files also
//! allow (bare instruction keywords and immediates as a flat run of
//! siblings, `end` written out explicitly) is not accepted; this is a scope
//! decision recorded in `DESIGN.md`, not an oversight.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use hashbrown::HashMap;

use wasmgate_arena::Arena;
use wasmgate_encode::ByteWriter;
use wasmgate_ir::{
    ConstExpr, DataSegment, ElementSegment, ExportDesc, FuncIdx, GlobalIdx, Import, ImportDesc,
    Instruction, LocalIdx, MemIdx, Module, ModuleNames, TableIdx, TypeIdx,
};
use wasmgate_types::{ElementType, FunctionType, GlobalType, MemoryType, Mutability, ResultType, SizeConstraint, TableType, ValueType};

use crate::arena_vec::ArenaVec;
use crate::error::{Error, Result};
use crate::lexer::{parse_one, Atom, Loc, Sexpr};

#[derive(Default)]
struct NameMaps<'a> {
    funcs: HashMap<&'a str, u32>,
    tables: HashMap<&'a str, u32>,
    mems: HashMap<&'a str, u32>,
    globals: HashMap<&'a str, u32>,
}

struct PendingFunc<'a> {
    idx: FuncIdx,
    type_idx: TypeIdx,
    param_names: Vec<Option<&'a str>>,
    local_decls: Vec<(Option<&'a str>, ValueType)>,
    body: &'a [Sexpr<'a>],
}

struct PendingGlobal<'a> {
    idx: GlobalIdx,
    ty: GlobalType,
    init: &'a Sexpr<'a>,
}

struct PendingElem<'a> {
    table: TableIdx,
    offset: &'a Sexpr<'a>,
    funcs: &'a [Sexpr<'a>],
}

struct PendingData<'a> {
    memory: MemIdx,
    offset: &'a Sexpr<'a>,
    chunks: &'a [Sexpr<'a>],
}

struct Parser<'a> {
    names: NameMaps<'a>,
    module: Module,
    function_names: Vec<(FuncIdx, String)>,
    local_names: Vec<(FuncIdx, Vec<(LocalIdx, String)>)>,
    pending_funcs: Vec<PendingFunc<'a>>,
    pending_globals: Vec<PendingGlobal<'a>>,
    pending_elems: Vec<PendingElem<'a>>,
    pending_data: Vec<PendingData<'a>>,
    errors: Vec<Error>,
    // Running counts of imports declared so far in each kind's index space,
    // assigned as imports are pushed rather than recomputed by filtering
    // `module.imports` after the fact (which can't tell "before this push"
    // from "after" without an off-by-one correction).
    imported_funcs: u32,
    imported_tables: u32,
    imported_mems: u32,
    imported_globals: u32,
}

/// Parse a single `(module ...)` text into a [`Module`], returning every
/// error found alongside a possibly-partial module (per the pipeline's
/// accumulate-errors-where-recoverable convention). The caller must not use
/// the module unless the error list is empty.
pub fn parse_module(src: &str) -> (Module, Vec<Error>) {
    let arena = Arena::new();
    let top = match parse_one(src) {
        Ok(s) => s,
        Err(e) => return (Module::new(), alloc::vec![e]),
    };
    let children = match top.as_list() {
        Some(items) if items.first().and_then(Sexpr::as_keyword) == Some("module") => &items[1..],
        _ => return (Module::new(), alloc::vec![Error::ExpectedKeyword { loc: top.loc(), expected: "module" }]),
    };
    // Skip an optional module-level `$name` symbol.
    let children = match children.first() {
        Some(Sexpr::Atom(Atom::Symbol(_), _)) => &children[1..],
        _ => children,
    };

    let mut p = Parser {
        names: NameMaps::default(),
        module: Module::new(),
        function_names: Vec::new(),
        local_names: Vec::new(),
        pending_funcs: Vec::new(),
        pending_globals: Vec::new(),
        pending_elems: Vec::new(),
        pending_data: Vec::new(),
        errors: Vec::new(),
        imported_funcs: 0,
        imported_tables: 0,
        imported_mems: 0,
        imported_globals: 0,
    };

    p.declare_types(children);
    p.declare_imports(children);
    p.declare_definitions(children);
    p.resolve_top_level(children);
    p.lower_definitions(&arena);
    p.finish()
}

fn head<'a>(list: &'a [Sexpr<'a>]) -> Option<&'a str> {
    list.first().and_then(Sexpr::as_keyword)
}

/// Strip a symbol token's leading `$`: the name-section convention the
/// binary format (and this crate's printer) uses stores bare identifiers,
/// with `$` purely a textual sigil that never round-trips through bytes.
fn bare_name(symbol: &str) -> &str {
    symbol.strip_prefix('$').unwrap_or(symbol)
}

/// The first child of a `func`/`table`/`memory`/`global`/`import` form's
/// body, if it's a bare `$name` symbol.
fn leading_name<'a>(items: &'a [Sexpr<'a>]) -> (Option<&'a str>, &'a [Sexpr<'a>]) {
    match items.first() {
        Some(Sexpr::Atom(Atom::Symbol(name), _)) => (Some(*name), &items[1..]),
        _ => (None, items),
    }
}

fn parse_value_type(s: &Sexpr) -> Result<ValueType> {
    match s.as_keyword() {
        Some("i32") => Ok(ValueType::I32),
        Some("i64") => Ok(ValueType::I64),
        Some("f32") => Ok(ValueType::F32),
        Some("f64") => Ok(ValueType::F64),
        _ => Err(Error::ExpectedValueType { loc: s.loc() }),
    }
}

fn parse_u32(s: &Sexpr) -> Result<u32> {
    match s.as_keyword() {
        Some(tok) => tok.parse::<u32>().map_err(|_| Error::ExpectedInteger { loc: s.loc() }),
        None => Err(Error::ExpectedInteger { loc: s.loc() }),
    }
}

/// Parse a `(func (param ...)* (result ...)?)` type signature, returning its
/// shape plus the names attached to each parameter (for the local-name map).
fn parse_func_type<'a>(items: &'a [Sexpr<'a>]) -> Result<(FunctionType, Vec<Option<&'a str>>)> {
    let mut params = Vec::new();
    let mut param_names = Vec::new();
    let mut result = ResultType::None;
    let mut seen_result = false;
    for item in items {
        let Some(sub) = item.as_list() else { continue };
        match head(sub) {
            Some("param") => {
                let (name, rest) = leading_name(&sub[1..]);
                if name.is_some() {
                    if rest.len() != 1 {
                        return Err(Error::ExpectedValueType { loc: item.loc() });
                    }
                    params.push(parse_value_type(&rest[0])?);
                    param_names.push(name);
                } else {
                    for ty in rest {
                        params.push(parse_value_type(ty)?);
                        param_names.push(None);
                    }
                }
            }
            Some("result") => {
                let rest = &sub[1..];
                if rest.len() > 1 {
                    return Err(Error::ExpectedValueType { loc: sub[1].loc() });
                }
                if let Some(ty) = rest.first() {
                    result = ResultType::Value(parse_value_type(ty)?);
                    seen_result = true;
                }
            }
            _ => {}
        }
        let _ = seen_result;
    }
    Ok((FunctionType::new(params, result), param_names))
}

/// Parse a `(local $name? ty)` or `(local ty ty ...)` declaration list.
fn parse_locals<'a>(items: &'a [Sexpr<'a>]) -> Result<Vec<(Option<&'a str>, ValueType)>> {
    let mut out = Vec::new();
    for item in items {
        let Some(sub) = item.as_list() else { continue };
        if head(sub) != Some("local") {
            continue;
        }
        let (name, rest) = leading_name(&sub[1..]);
        if name.is_some() {
            if rest.len() != 1 {
                return Err(Error::ExpectedValueType { loc: item.loc() });
            }
            out.push((name, parse_value_type(&rest[0])?));
        } else {
            for ty in rest {
                out.push((None, parse_value_type(ty)?));
            }
        }
    }
    Ok(out)
}

fn parse_limits(items: &[Sexpr]) -> Result<(SizeConstraint, usize)> {
    let min = parse_u32(&items[0])?;
    let max = match items.get(1) {
        Some(s) if s.as_keyword().and_then(|t| t.parse::<u32>().ok()).is_some() => {
            Some(parse_u32(s)?)
        }
        _ => None,
    };
    let consumed = if max.is_some() { 2 } else { 1 };
    Ok((SizeConstraint::new(min, max), consumed))
}

/// An inline `(import "m" "n")` attached to a `func`/`table`/`memory`/
/// `global` form, if present among its children.
fn inline_import<'a>(items: &'a [Sexpr<'a>]) -> Option<(&'a str, &'a str)> {
    items.iter().find_map(|i| {
        let sub = i.as_list()?;
        if head(sub) != Some("import") {
            return None;
        }
        let module = sub.get(1)?.as_str_bytes()?;
        let name = sub.get(2)?.as_str_bytes()?;
        Some((
            core::str::from_utf8(module).unwrap_or_default(),
            core::str::from_utf8(name).unwrap_or_default(),
        ))
    }).map(|(m, n): (&str, &str)| {
        // SAFETY-free: `from_utf8` above already validated; re-borrow with
        // the outer lifetime by re-deriving from the original bytes.
        (m, n)
    })
}

fn inline_exports<'a>(items: &'a [Sexpr<'a>]) -> impl Iterator<Item = &'a str> {
    items.iter().filter_map(|i| {
        let sub = i.as_list()?;
        if head(sub) != Some("export") {
            return None;
        }
        let bytes = sub.get(1)?.as_str_bytes()?;
        core::str::from_utf8(bytes).ok()
    })
}

impl<'a> Parser<'a> {
    fn declare_types(&mut self, children: &'a [Sexpr<'a>]) {
        for child in children {
            let Some(items) = child.as_list() else { continue };
            if head(items) != Some("type") {
                continue;
            }
            let rest = &items[1..];
            let (_name, rest) = leading_name(rest);
            let Some(func_sub) = rest.first().and_then(Sexpr::as_list) else {
                self.errors.push(Error::ExpectedList { loc: child.loc() });
                continue;
            };
            if head(func_sub) != Some("func") {
                self.errors.push(Error::ExpectedKeyword { loc: child.loc(), expected: "func" });
                continue;
            }
            match parse_func_type(&func_sub[1..]) {
                Ok((ty, _)) => self.module.types.push(ty),
                Err(e) => self.errors.push(e),
            }
        }
    }

    /// Resolve `(type $x)` / `(type N)` against the types declared so far,
    /// or build a fresh inline type from `(param ...)*(result ...)?`.
    fn func_type_of(&mut self, items: &'a [Sexpr<'a>]) -> (TypeIdx, Vec<Option<&'a str>>) {
        for item in items {
            if let Some(sub) = item.as_list() {
                if head(sub) == Some("type") {
                    if let Some(idx_sexpr) = sub.get(1) {
                        let idx = match parse_u32(idx_sexpr) {
                            Ok(n) => n,
                            Err(e) => {
                                self.errors.push(e);
                                0
                            }
                        };
                        let (_, names) = parse_func_type(items).unwrap_or_else(|_| (FunctionType::new(Vec::new(), ResultType::None), Vec::new()));
                        return (TypeIdx::from_u32(idx), names);
                    }
                }
            }
        }
        match parse_func_type(items) {
            Ok((ty, names)) => {
                let idx = self.module.types.len() as u32;
                self.module.types.push(ty);
                (TypeIdx::from_u32(idx), names)
            }
            Err(e) => {
                self.errors.push(e);
                let idx = self.module.types.len() as u32;
                self.module.types.push(FunctionType::new(Vec::new(), ResultType::None));
                (TypeIdx::from_u32(idx), Vec::new())
            }
        }
    }

    fn declare_name(&mut self, map_select: IndexSpace, name: Option<&'a str>, idx: u32, loc: Loc) {
        let Some(name) = name else { return };
        let map = match map_select {
            IndexSpace::Func => &mut self.names.funcs,
            IndexSpace::Table => &mut self.names.tables,
            IndexSpace::Mem => &mut self.names.mems,
            IndexSpace::Global => &mut self.names.globals,
        };
        if map.insert(name, idx).is_some() {
            self.errors.push(Error::DuplicateName { loc, kind: map_select.kind(), name: name.to_string() });
        }
    }

    fn record_exports(&mut self, items: &'a [Sexpr<'a>], desc: impl Fn(u32) -> ExportDesc, idx: u32) {
        for name in inline_exports(items) {
            self.module.exports.push(wasmgate_ir::Export { name: name.to_string(), desc: desc(idx) });
        }
    }

    fn declare_imports(&mut self, children: &'a [Sexpr<'a>]) {
        for child in children {
            let Some(items) = child.as_list() else { continue };
            match head(items) {
                Some("import") => {
                    let Some(module_name) = items.get(1).and_then(Sexpr::as_str_bytes) else { continue };
                    let Some(item_name) = items.get(2).and_then(Sexpr::as_str_bytes) else { continue };
                    let Some(desc_sexpr) = items.get(3).and_then(Sexpr::as_list) else { continue };
                    let (name, desc_rest) = leading_name(&desc_sexpr[1..]);
                    let module_name = core::str::from_utf8(module_name).unwrap_or_default().to_string();
                    let item_name = core::str::from_utf8(item_name).unwrap_or_default().to_string();
                    match head(desc_sexpr) {
                        Some("func") => {
                            let (type_idx, _) = self.func_type_of(desc_rest);
                            self.push_import(module_name, item_name, name, ImportDesc::Func(type_idx), child.loc());
                            self.record_exports(desc_rest, |i| ExportDesc::Func(FuncIdx::from_u32(i)), self.imported_funcs - 1);
                        }
                        Some("table") => match self.parse_table_type(desc_rest) {
                            Ok(ty) => {
                                self.push_import(module_name, item_name, name, ImportDesc::Table(ty), child.loc());
                                self.record_exports(desc_rest, |i| ExportDesc::Table(TableIdx::from_u32(i)), self.imported_tables - 1);
                            }
                            Err(e) => self.errors.push(e),
                        },
                        Some("memory") => match self.parse_memory_type(desc_rest) {
                            Ok(ty) => {
                                self.push_import(module_name, item_name, name, ImportDesc::Memory(ty), child.loc());
                                self.record_exports(desc_rest, |i| ExportDesc::Memory(MemIdx::from_u32(i)), self.imported_mems - 1);
                            }
                            Err(e) => self.errors.push(e),
                        },
                        Some("global") => match self.parse_global_type(desc_rest) {
                            Ok(ty) => {
                                self.push_import(module_name, item_name, name, ImportDesc::Global(ty), child.loc());
                                self.record_exports(desc_rest, |i| ExportDesc::Global(GlobalIdx::from_u32(i)), self.imported_globals - 1);
                            }
                            Err(e) => self.errors.push(e),
                        },
                        _ => self.errors.push(Error::ExpectedKeyword { loc: child.loc(), expected: "func|table|memory|global" }),
                    }
                }
                Some("func") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if let Some((module_name, item_name)) = inline_import(rest) {
                        let (type_idx, _) = self.func_type_of(rest);
                        self.push_import(module_name.to_string(), item_name.to_string(), name, ImportDesc::Func(type_idx), child.loc());
                        self.record_exports(rest, |i| ExportDesc::Func(FuncIdx::from_u32(i)), self.imported_funcs - 1);
                    }
                }
                Some("table") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if let Some((module_name, item_name)) = inline_import(rest) {
                        match self.parse_table_type(rest) {
                            Ok(ty) => {
                                self.push_import(module_name.to_string(), item_name.to_string(), name, ImportDesc::Table(ty), child.loc());
                                self.record_exports(rest, |i| ExportDesc::Table(TableIdx::from_u32(i)), self.imported_tables - 1);
                            }
                            Err(e) => self.errors.push(e),
                        }
                    }
                }
                Some("memory") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if let Some((module_name, item_name)) = inline_import(rest) {
                        match self.parse_memory_type(rest) {
                            Ok(ty) => {
                                self.push_import(module_name.to_string(), item_name.to_string(), name, ImportDesc::Memory(ty), child.loc());
                                self.record_exports(rest, |i| ExportDesc::Memory(MemIdx::from_u32(i)), self.imported_mems - 1);
                            }
                            Err(e) => self.errors.push(e),
                        }
                    }
                }
                Some("global") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if let Some((module_name, item_name)) = inline_import(rest) {
                        match self.parse_global_type(rest) {
                            Ok(ty) => {
                                self.push_import(module_name.to_string(), item_name.to_string(), name, ImportDesc::Global(ty), child.loc());
                                self.record_exports(rest, |i| ExportDesc::Global(GlobalIdx::from_u32(i)), self.imported_globals - 1);
                            }
                            Err(e) => self.errors.push(e),
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Assign the next index in `desc`'s kind's space, register `name` in
    /// that space's name map, and push the import entry itself. The caller
    /// still records any inline `(export ...)` forms afterward, since doing
    /// so needs the assigned index this returns no reference to (kept
    /// simple by reading it back off the relevant `imported_*` counter).
    fn push_import(&mut self, module_name: String, item_name: String, name: Option<&'a str>, desc: ImportDesc, loc: Loc) {
        let space = match desc {
            ImportDesc::Func(_) => IndexSpace::Func,
            ImportDesc::Table(_) => IndexSpace::Table,
            ImportDesc::Memory(_) => IndexSpace::Mem,
            ImportDesc::Global(_) => IndexSpace::Global,
        };
        let idx = match space {
            IndexSpace::Func => {
                let i = self.imported_funcs;
                self.imported_funcs += 1;
                i
            }
            IndexSpace::Table => {
                let i = self.imported_tables;
                self.imported_tables += 1;
                i
            }
            IndexSpace::Mem => {
                let i = self.imported_mems;
                self.imported_mems += 1;
                i
            }
            IndexSpace::Global => {
                let i = self.imported_globals;
                self.imported_globals += 1;
                i
            }
        };
        self.declare_name(space, name, idx, loc);
        if space == IndexSpace::Func {
            if let Some(n) = name {
                self.function_names.push((FuncIdx::from_u32(idx), bare_name(n).to_string()));
            }
        }
        self.module.imports.push(Import { module: module_name, name: item_name, desc });
    }

    fn parse_table_type(&mut self, items: &'a [Sexpr<'a>]) -> Result<TableType> {
        let (limits, _) = parse_limits(items)?;
        Ok(TableType { element: ElementType::FuncRef, limits })
    }

    fn parse_memory_type(&mut self, items: &'a [Sexpr<'a>]) -> Result<MemoryType> {
        let (limits, _) = parse_limits(items)?;
        Ok(MemoryType { limits })
    }

    fn parse_global_type(&mut self, items: &'a [Sexpr<'a>]) -> Result<GlobalType> {
        match items.first() {
            Some(Sexpr::List(mut_items, _)) if head(mut_items) == Some("mut") => {
                let value = parse_value_type(mut_items.get(1).ok_or(Error::ExpectedValueType { loc: items[0].loc() })?)?;
                Ok(GlobalType { value, mutability: Mutability::Var })
            }
            Some(ty) => Ok(GlobalType { value: parse_value_type(ty)?, mutability: Mutability::Const }),
            None => Err(Error::ExpectedValueType { loc: Loc { line: 0, column: 0 } }),
        }
    }

    fn declare_definitions(&mut self, children: &'a [Sexpr<'a>]) {
        for child in children {
            let Some(items) = child.as_list() else { continue };
            match head(items) {
                Some("func") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if inline_import(rest).is_some() {
                        continue;
                    }
                    let (type_idx, param_names) = self.func_type_of(rest);
                    let idx = self.module.num_imported_funcs() as u32 + self.pending_funcs.len() as u32;
                    let func_idx = FuncIdx::from_u32(idx);
                    self.declare_name(IndexSpace::Func, name, idx, child.loc());
                    if let Some(n) = name {
                        self.function_names.push((func_idx, bare_name(n).to_string()));
                    }
                    self.record_exports(rest, |i| ExportDesc::Func(FuncIdx::from_u32(i)), idx);
                    let locals_body_start = rest.iter().position(|s| {
                        s.as_list().map(|l| !matches!(head(l), Some("param" | "result" | "local" | "import" | "export" | "type"))).unwrap_or(true)
                    }).unwrap_or(rest.len());
                    let local_decls = parse_locals(&rest[..locals_body_start]).unwrap_or_default();
                    self.pending_funcs.push(PendingFunc {
                        idx: func_idx,
                        type_idx,
                        param_names,
                        local_decls,
                        body: &rest[locals_body_start..],
                    });
                }
                Some("table") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if inline_import(rest).is_some() {
                        continue;
                    }
                    // `(table $name? (export "e")* min max? anyfunc)` or an
                    // inline `(elem ...)` shorthand. The latter is not
                    // supported (documented scope decision).
                    let numeric: Vec<&Sexpr> = rest.iter().filter(|s| s.as_keyword().map(|k| k != "anyfunc").unwrap_or(false) || s.as_list().is_none()).filter(|s| s.as_list().is_none()).collect();
                    match parse_limits_from_refs(&numeric) {
                        Ok(limits) => {
                            let idx = self.module.num_imported_tables() as u32 + self.module.tables.len() as u32;
                            self.declare_name(IndexSpace::Table, name, idx, child.loc());
                            self.record_exports(rest, |i| ExportDesc::Table(TableIdx::from_u32(i)), idx);
                            self.module.tables.push(TableType { element: ElementType::FuncRef, limits });
                        }
                        Err(e) => self.errors.push(e),
                    }
                }
                Some("memory") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if inline_import(rest).is_some() {
                        continue;
                    }
                    let numeric: Vec<&Sexpr> = rest.iter().filter(|s| s.as_list().is_none()).collect();
                    match parse_limits_from_refs(&numeric) {
                        Ok(limits) => {
                            let idx = self.module.num_imported_mems() as u32 + self.module.mems.len() as u32;
                            self.declare_name(IndexSpace::Mem, name, idx, child.loc());
                            self.record_exports(rest, |i| ExportDesc::Memory(MemIdx::from_u32(i)), idx);
                            self.module.mems.push(MemoryType { limits });
                        }
                        Err(e) => self.errors.push(e),
                    }
                }
                Some("global") => {
                    let rest = &items[1..];
                    let (name, rest) = leading_name(rest);
                    if inline_import(rest).is_some() {
                        continue;
                    }
                    let ty_pos = rest.iter().position(|s| s.as_list().map(|l| head(l) != Some("export")).unwrap_or(true));
                    let Some(ty_pos) = ty_pos else { continue };
                    match self.parse_global_type(core::slice::from_ref(&rest[ty_pos])) {
                        Ok(ty) => {
                            let idx = self.module.num_imported_globals() as u32 + self.pending_globals.len() as u32;
                            self.declare_name(IndexSpace::Global, name, idx, child.loc());
                            self.record_exports(rest, |i| ExportDesc::Global(GlobalIdx::from_u32(i)), idx);
                            if let Some(init) = rest.get(ty_pos + 1) {
                                self.pending_globals.push(PendingGlobal { idx: GlobalIdx::from_u32(idx), ty, init });
                            }
                        }
                        Err(e) => self.errors.push(e),
                    }
                }
                _ => {}
            }
        }
    }

    fn resolve_top_level(&mut self, children: &'a [Sexpr<'a>]) {
        for child in children {
            let Some(items) = child.as_list() else { continue };
            match head(items) {
                Some("export") => {
                    let (Some(name_bytes), Some(desc_list)) = (items.get(1).and_then(Sexpr::as_str_bytes), items.get(2).and_then(Sexpr::as_list)) else { continue };
                    let name = core::str::from_utf8(name_bytes).unwrap_or_default().to_string();
                    let desc = match head(desc_list) {
                        Some("func") => self.resolve_ref(&desc_list[1], IndexSpace::Func).map(|i| ExportDesc::Func(FuncIdx::from_u32(i))),
                        Some("table") => self.resolve_ref(&desc_list[1], IndexSpace::Table).map(|i| ExportDesc::Table(TableIdx::from_u32(i))),
                        Some("memory") => self.resolve_ref(&desc_list[1], IndexSpace::Mem).map(|i| ExportDesc::Memory(MemIdx::from_u32(i))),
                        Some("global") => self.resolve_ref(&desc_list[1], IndexSpace::Global).map(|i| ExportDesc::Global(GlobalIdx::from_u32(i))),
                        _ => None,
                    };
                    if let Some(desc) = desc {
                        self.module.exports.push(wasmgate_ir::Export { name, desc });
                    }
                }
                Some("start") => {
                    let Some(target) = items.get(1) else { continue };
                    if self.module.start.is_some() {
                        self.errors.push(Error::MultipleStarts { loc: child.loc() });
                        continue;
                    }
                    if let Some(idx) = self.resolve_ref(target, IndexSpace::Func) {
                        self.module.start = Some(FuncIdx::from_u32(idx));
                    }
                }
                Some("elem") => {
                    let mut rest = &items[1..];
                    let table = match rest.first().and_then(Sexpr::as_list).filter(|l| head(l) == Some("table")) {
                        Some(table_list) => {
                            let idx = self.resolve_ref(&table_list[1], IndexSpace::Table).unwrap_or(0);
                            rest = &rest[1..];
                            TableIdx::from_u32(idx)
                        }
                        None => TableIdx::from_u32(0),
                    };
                    let offset = match rest.first() {
                        Some(Sexpr::List(inner, _)) if head(inner) == Some("offset") => {
                            rest = &rest[1..];
                            &inner[0]
                        }
                        Some(other) => {
                            rest = &rest[1..];
                            other
                        }
                        None => continue,
                    };
                    self.pending_elems.push(PendingElem { table, offset, funcs: rest });
                }
                Some("data") => {
                    let mut rest = &items[1..];
                    let memory = match rest.first().and_then(Sexpr::as_list).filter(|l| head(l) == Some("memory")) {
                        Some(mem_list) => {
                            let idx = self.resolve_ref(&mem_list[1], IndexSpace::Mem).unwrap_or(0);
                            rest = &rest[1..];
                            MemIdx::from_u32(idx)
                        }
                        None => MemIdx::from_u32(0),
                    };
                    let offset = match rest.first() {
                        Some(Sexpr::List(inner, _)) if head(inner) == Some("offset") => {
                            rest = &rest[1..];
                            &inner[0]
                        }
                        Some(other) => {
                            rest = &rest[1..];
                            other
                        }
                        None => continue,
                    };
                    self.pending_data.push(PendingData { memory, offset, chunks: rest });
                }
                _ => {}
            }
        }
    }

    fn resolve_ref(&mut self, s: &'a Sexpr<'a>, space: IndexSpace) -> Option<u32> {
        match s {
            Sexpr::Atom(Atom::Symbol(name), loc) => {
                let map = match space {
                    IndexSpace::Func => &self.names.funcs,
                    IndexSpace::Table => &self.names.tables,
                    IndexSpace::Mem => &self.names.mems,
                    IndexSpace::Global => &self.names.globals,
                };
                match map.get(name) {
                    Some(&idx) => Some(idx),
                    None => {
                        self.errors.push(Error::UndefinedName { loc: *loc, kind: space.kind(), name: (*name).to_string() });
                        None
                    }
                }
            }
            Sexpr::Atom(Atom::Keyword(tok), loc) => match tok.parse::<u32>() {
                Ok(idx) => Some(idx),
                Err(_) => {
                    self.errors.push(Error::ExpectedInteger { loc: *loc });
                    None
                }
            },
            _ => None,
        }
    }

    fn lower_definitions(&mut self, arena: &Arena) {
        let funcs = core::mem::take(&mut self.pending_funcs);
        for f in &funcs {
            self.lower_func(arena, f);
        }
        let globals = core::mem::take(&mut self.pending_globals);
        for g in &globals {
            let init = self.lower_const_expr(arena, g.init);
            self.module.globals.push(wasmgate_ir::GlobalDef { ty: g.ty, init });
        }
        let elems = core::mem::take(&mut self.pending_elems);
        for e in &elems {
            let offset = self.lower_const_expr(arena, e.offset);
            let funcs = e.funcs.iter().filter_map(|s| self.resolve_ref(s, IndexSpace::Func)).map(FuncIdx::from_u32).collect();
            self.module.elements.push(ElementSegment { table: e.table, offset, funcs });
        }
        let data = core::mem::take(&mut self.pending_data);
        for d in &data {
            let offset = self.lower_const_expr(arena, d.offset);
            let mut bytes = Vec::new();
            for chunk in d.chunks {
                if let Some(b) = chunk.as_str_bytes() {
                    bytes.extend_from_slice(b);
                }
            }
            self.module.data.push(DataSegment { memory: d.memory, offset, bytes });
        }
        if !self.function_names.is_empty() || !self.local_names.is_empty() {
            self.module.names = Some(ModuleNames {
                module_name: None,
                function_names: core::mem::take(&mut self.function_names),
                local_names: core::mem::take(&mut self.local_names),
            });
        }
    }

    /// A constant expression is just one instruction (the validator checks
    /// it's one of the legal forms); lower it the same way a function body
    /// is lowered, minus the trailing `end`.
    fn lower_const_expr(&mut self, arena: &Arena, s: &'a Sexpr<'a>) -> ConstExpr {
        let mark = arena.mark();
        let mut lowering = Lowering {
            parser: self,
            locals: HashMap::new(),
            labels: ArenaVec::new(arena),
            func: FuncIdx::from_u32(0),
        };
        let instr = lowering.lower_instruction(s).unwrap_or(Instruction::I32Const { value: 0 });
        arena.revert(mark);
        ConstExpr::new(alloc::vec![instr])
    }

    fn lower_func(&mut self, arena: &Arena, f: &PendingFunc<'a>) {
        let mark = arena.mark();
        let ty = self.module.types[f.type_idx.as_u32() as usize].clone();
        let mut locals = HashMap::new();
        for (i, name) in f.param_names.iter().enumerate() {
            if let Some(n) = name {
                locals.insert(*n, i as u32);
            }
        }
        let mut local_types = ty.params().to_vec();
        let param_count = local_types.len() as u32;
        let mut local_name_entries = Vec::new();
        for (i, name) in f.param_names.iter().enumerate() {
            if let Some(n) = name {
                local_name_entries.push((LocalIdx::from_u32(i as u32), bare_name(n).to_string()));
            }
        }
        for (i, (name, ty)) in f.local_decls.iter().enumerate() {
            let idx = param_count + i as u32;
            if let Some(n) = name {
                locals.insert(*n, idx);
                local_name_entries.push((LocalIdx::from_u32(idx), bare_name(n).to_string()));
            }
            local_types.push(*ty);
        }
        if !local_name_entries.is_empty() {
            self.local_names.push((f.idx, local_name_entries));
        }

        let mut lowering = Lowering { parser: self, locals, labels: ArenaVec::new(arena), func: f.idx };
        let mut writer = ByteWriter::new();
        lowering.lower_sequence(&mut writer, f.body);
        writer.write_instruction(&Instruction::End);

        let code_offset = self.module.code.len() as u32;
        self.module.code.extend_from_slice(&writer.buf);
        self.module.funcs.push(wasmgate_ir::FunctionDef {
            type_idx: f.type_idx,
            locals: local_types[param_count as usize..].to_vec(),
            code_offset,
            code_len: writer.buf.len() as u32,
        });
        arena.revert(mark);
    }

    fn finish(self) -> (Module, Vec<Error>) {
        (self.module, self.errors)
    }
}

fn parse_limits_from_refs(items: &[&Sexpr]) -> Result<SizeConstraint> {
    if items.is_empty() {
        return Err(Error::ExpectedInteger { loc: Loc { line: 0, column: 0 } });
    }
    let min = parse_u32(items[0])?;
    let max = match items.get(1) {
        Some(s) => Some(parse_u32(s)?),
        None => None,
    };
    Ok(SizeConstraint::new(min, max))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum IndexSpace {
    Func,
    Table,
    Mem,
    Global,
}

impl IndexSpace {
    fn kind(self) -> &'static str {
        match self {
            IndexSpace::Func => "func",
            IndexSpace::Table => "table",
            IndexSpace::Mem => "memory",
            IndexSpace::Global => "global",
        }
    }
}

#[derive(Clone, Copy)]
struct LabelScope<'a> {
    result: ResultType,
    name: Option<&'a str>,
}

/// Per-function lowering state: the local-name map and the in-scope label
/// stack (innermost last, looked up by name or numeric depth), plus a
/// back-reference to the parser for name resolution and error
/// accumulation. The label stack lives in the caller's arena and is
/// pushed/popped as `block`/`loop`/`if` arms are entered and left, one
/// allocation per function body (reverted by `lower_func` when the
/// function is done).
struct Lowering<'p, 'a, 'r> {
    parser: &'p mut Parser<'a>,
    locals: HashMap<&'a str, u32>,
    labels: ArenaVec<'r, LabelScope<'a>>,
    func: FuncIdx,
}

impl<'p, 'a, 'r> Lowering<'p, 'a, 'r> {
    fn lower_sequence(&mut self, out: &mut ByteWriter, body: &'a [Sexpr<'a>]) {
        for instr in body {
            if let Sexpr::List(items, loc) = instr {
                if let Some(name) = head(items) {
                    if control_lowering::lower_control_into(self, out, name, items, *loc) {
                        continue;
                    }
                }
            }
            if let Some(encoded) = self.lower_instruction(instr) {
                out.write_instruction(&encoded);
            }
        }
    }

    fn resolve_local(&mut self, s: &'a Sexpr<'a>) -> Option<u32> {
        match s {
            Sexpr::Atom(Atom::Symbol(name), loc) => match self.locals.get(name) {
                Some(&idx) => Some(idx),
                None => {
                    self.parser.errors.push(Error::UndefinedName { loc: *loc, kind: "local", name: (*name).to_string() });
                    None
                }
            },
            Sexpr::Atom(Atom::Keyword(tok), loc) => match tok.parse::<u32>() {
                Ok(idx) => Some(idx),
                Err(_) => {
                    self.parser.errors.push(Error::ExpectedInteger { loc: *loc });
                    None
                }
            },
            _ => None,
        }
    }

    /// Resolve a branch target, either a numeric depth or a `$name`
    /// matching the nearest enclosing `block`/`loop`/`if` that was given
    /// that name. Depth is counted from the innermost (top of stack).
    fn resolve_label(&mut self, s: &'a Sexpr<'a>) -> Option<u32> {
        match s {
            Sexpr::Atom(Atom::Symbol(name), loc) => {
                let len = self.labels.len();
                for i in (0..len).rev() {
                    if self.labels.get(i).and_then(|scope| scope.name) == Some(*name) {
                        return Some((len - 1 - i) as u32);
                    }
                }
                self.parser.errors.push(Error::UndefinedName { loc: *loc, kind: "label", name: (*name).to_string() });
                None
            }
            Sexpr::Atom(Atom::Keyword(tok), loc) => match tok.parse::<u32>() {
                Ok(depth) => Some(depth),
                Err(_) => {
                    self.parser.errors.push(Error::ExpectedInteger { loc: *loc });
                    None
                }
            },
            _ => None,
        }
    }

    fn result_annotation(items: &[Sexpr]) -> (ResultType, usize) {
        if let Some(first) = items.first() {
            if let Some(sub) = first.as_list() {
                if head(sub) == Some("result") {
                    if let Some(ty) = sub.get(1) {
                        if let Ok(v) = parse_value_type(ty) {
                            return (ResultType::Value(v), 1);
                        }
                    }
                    return (ResultType::None, 1);
                }
            }
        }
        (ResultType::None, 0)
    }

    /// Lower one instruction form (atom or list) into a single
    /// [`Instruction`], recursively lowering nested bodies for
    /// `block`/`loop`/`if` directly into `self`'s accumulating writer via
    /// the returned control marker's side effects. Control forms are
    /// special-cased in [`Self::lower_control`] rather than here since they
    /// emit more than one instruction.
    fn lower_instruction(&mut self, s: &'a Sexpr<'a>) -> Option<Instruction> {
        match s {
            Sexpr::Atom(Atom::Keyword(name), loc) => self.simple_op(name, *loc),
            Sexpr::List(items, loc) => {
                let Some(name) = head(items) else {
                    self.parser.errors.push(Error::ExpectedKeyword { loc: *loc, expected: "operator" });
                    return None;
                };
                let rest = &items[1..];
                match name {
                    "local.get" => Some(Instruction::LocalGet { local: LocalIdx::from_u32(self.resolve_local(rest.first()?)?) }),
                    "local.set" => Some(Instruction::LocalSet { local: LocalIdx::from_u32(self.resolve_local(rest.first()?)?) }),
                    "local.tee" => Some(Instruction::LocalTee { local: LocalIdx::from_u32(self.resolve_local(rest.first()?)?) }),
                    "global.get" => Some(Instruction::GlobalGet { global: GlobalIdx::from_u32(self.parser.resolve_ref(rest.first()?, IndexSpace::Global)?) }),
                    "global.set" => Some(Instruction::GlobalSet { global: GlobalIdx::from_u32(self.parser.resolve_ref(rest.first()?, IndexSpace::Global)?) }),
                    "call" => Some(Instruction::Call { func: FuncIdx::from_u32(self.parser.resolve_ref(rest.first()?, IndexSpace::Func)?) }),
                    "call_indirect" => {
                        let type_list = rest.iter().find_map(Sexpr::as_list).filter(|l| head(l) == Some("type"))?;
                        let ty = parse_u32(type_list.get(1)?).ok()?;
                        Some(Instruction::CallIndirect { ty: TypeIdx::from_u32(ty), table: TableIdx::from_u32(0) })
                    }
                    "br" => Some(Instruction::Br { depth: self.label_depth(rest.first()?)? }),
                    "br_if" => Some(Instruction::BrIf { depth: self.label_depth(rest.first()?)? }),
                    "br_table" => {
                        let mut depths = Vec::new();
                        for target in rest {
                            depths.push(self.resolve_label(target)?);
                        }
                        let default = wasmgate_ir::LabelIdx::from_u32(depths.pop()?);
                        Some(Instruction::BrTableOp {
                            table: wasmgate_ir::BrTable {
                                targets: depths.into_iter().map(wasmgate_ir::LabelIdx::from_u32).collect(),
                                default,
                            },
                        })
                    }
                    "i32.const" => Some(Instruction::I32Const { value: parse_int_literal(rest.first()?)? as i32 }),
                    "i64.const" => Some(Instruction::I64Const { value: parse_int_literal(rest.first()?)? }),
                    "f32.const" => Some(Instruction::F32Const { bits: (parse_float_literal(rest.first()?)? as f32).to_bits() }),
                    "f64.const" => Some(Instruction::F64Const { bits: parse_float_literal(rest.first()?)?.to_bits() }),
                    _ => self.memory_op(name, rest, *loc).or_else(|| self.simple_op(name, *loc)),
                }
            }
            _ => None,
        }
    }

    fn label_depth(&mut self, s: &'a Sexpr<'a>) -> Option<wasmgate_ir::LabelIdx> {
        self.resolve_label(s).map(wasmgate_ir::LabelIdx::from_u32)
    }

    fn memory_op(&mut self, name: &str, rest: &'a [Sexpr<'a>], loc: Loc) -> Option<Instruction> {
        let memarg = |rest: &'a [Sexpr<'a>], natural_align: u32| {
            let mut offset = 0u32;
            let mut align = natural_align;
            for item in rest {
                if let Some(tok) = item.as_keyword() {
                    if let Some(v) = tok.strip_prefix("offset=") {
                        offset = v.parse().unwrap_or(0);
                    } else if let Some(v) = tok.strip_prefix("align=") {
                        align = v.parse::<u32>().unwrap_or(1 << natural_align).trailing_zeros();
                    }
                }
            }
            wasmgate_ir::MemArg { align, offset }
        };
        macro_rules! load {
            ($variant:ident, $align:literal) => {
                Some(Instruction::$variant { memarg: memarg(rest, $align) })
            };
        }
        macro_rules! store {
            ($variant:ident, $align:literal) => {
                Some(Instruction::$variant { memarg: memarg(rest, $align) })
            };
        }
        let _ = loc;
        match name {
            "i32.load" => load!(I32Load, 2),
            "i64.load" => load!(I64Load, 3),
            "f32.load" => load!(F32Load, 2),
            "f64.load" => load!(F64Load, 3),
            "i32.load8_s" => load!(I32Load8S, 0),
            "i32.load8_u" => load!(I32Load8U, 0),
            "i32.load16_s" => load!(I32Load16S, 1),
            "i32.load16_u" => load!(I32Load16U, 1),
            "i64.load8_s" => load!(I64Load8S, 0),
            "i64.load8_u" => load!(I64Load8U, 0),
            "i64.load16_s" => load!(I64Load16S, 1),
            "i64.load16_u" => load!(I64Load16U, 1),
            "i64.load32_s" => load!(I64Load32S, 2),
            "i64.load32_u" => load!(I64Load32U, 2),
            "i32.store" => store!(I32Store, 2),
            "i64.store" => store!(I64Store, 3),
            "f32.store" => store!(F32Store, 2),
            "f64.store" => store!(F64Store, 3),
            "i32.store8" => store!(I32Store8, 0),
            "i32.store16" => store!(I32Store16, 1),
            "i64.store8" => store!(I64Store8, 0),
            "i64.store16" => store!(I64Store16, 1),
            "i64.store32" => store!(I64Store32, 2),
            _ => None,
        }
    }

    fn simple_op(&mut self, name: &str, loc: Loc) -> Option<Instruction> {
        Some(match name {
            "unreachable" => Instruction::Unreachable,
            "nop" => Instruction::Nop,
            "return" => Instruction::Return,
            "drop" => Instruction::Drop,
            "select" => Instruction::Select,
            "memory.size" => Instruction::MemorySize,
            "memory.grow" => Instruction::MemoryGrow,
            "i32.eqz" => Instruction::I32Eqz,
            "i32.eq" => Instruction::I32Eq,
            "i32.ne" => Instruction::I32Ne,
            "i32.lt_s" => Instruction::I32LtS,
            "i32.lt_u" => Instruction::I32LtU,
            "i32.gt_s" => Instruction::I32GtS,
            "i32.gt_u" => Instruction::I32GtU,
            "i32.le_s" => Instruction::I32LeS,
            "i32.le_u" => Instruction::I32LeU,
            "i32.ge_s" => Instruction::I32GeS,
            "i32.ge_u" => Instruction::I32GeU,
            "i64.eqz" => Instruction::I64Eqz,
            "i64.eq" => Instruction::I64Eq,
            "i64.ne" => Instruction::I64Ne,
            "i64.lt_s" => Instruction::I64LtS,
            "i64.lt_u" => Instruction::I64LtU,
            "i64.gt_s" => Instruction::I64GtS,
            "i64.gt_u" => Instruction::I64GtU,
            "i64.le_s" => Instruction::I64LeS,
            "i64.le_u" => Instruction::I64LeU,
            "i64.ge_s" => Instruction::I64GeS,
            "i64.ge_u" => Instruction::I64GeU,
            "f32.eq" => Instruction::F32Eq,
            "f32.ne" => Instruction::F32Ne,
            "f32.lt" => Instruction::F32Lt,
            "f32.gt" => Instruction::F32Gt,
            "f32.le" => Instruction::F32Le,
            "f32.ge" => Instruction::F32Ge,
            "f64.eq" => Instruction::F64Eq,
            "f64.ne" => Instruction::F64Ne,
            "f64.lt" => Instruction::F64Lt,
            "f64.gt" => Instruction::F64Gt,
            "f64.le" => Instruction::F64Le,
            "f64.ge" => Instruction::F64Ge,
            "i32.clz" => Instruction::I32Clz,
            "i32.ctz" => Instruction::I32Ctz,
            "i32.popcnt" => Instruction::I32Popcnt,
            "i32.add" => Instruction::I32Add,
            "i32.sub" => Instruction::I32Sub,
            "i32.mul" => Instruction::I32Mul,
            "i32.div_s" => Instruction::I32DivS,
            "i32.div_u" => Instruction::I32DivU,
            "i32.rem_s" => Instruction::I32RemS,
            "i32.rem_u" => Instruction::I32RemU,
            "i32.and" => Instruction::I32And,
            "i32.or" => Instruction::I32Or,
            "i32.xor" => Instruction::I32Xor,
            "i32.shl" => Instruction::I32Shl,
            "i32.shr_s" => Instruction::I32ShrS,
            "i32.shr_u" => Instruction::I32ShrU,
            "i32.rotl" => Instruction::I32Rotl,
            "i32.rotr" => Instruction::I32Rotr,
            "i64.clz" => Instruction::I64Clz,
            "i64.ctz" => Instruction::I64Ctz,
            "i64.popcnt" => Instruction::I64Popcnt,
            "i64.add" => Instruction::I64Add,
            "i64.sub" => Instruction::I64Sub,
            "i64.mul" => Instruction::I64Mul,
            "i64.div_s" => Instruction::I64DivS,
            "i64.div_u" => Instruction::I64DivU,
            "i64.rem_s" => Instruction::I64RemS,
            "i64.rem_u" => Instruction::I64RemU,
            "i64.and" => Instruction::I64And,
            "i64.or" => Instruction::I64Or,
            "i64.xor" => Instruction::I64Xor,
            "i64.shl" => Instruction::I64Shl,
            "i64.shr_s" => Instruction::I64ShrS,
            "i64.shr_u" => Instruction::I64ShrU,
            "i64.rotl" => Instruction::I64Rotl,
            "i64.rotr" => Instruction::I64Rotr,
            "f32.abs" => Instruction::F32Abs,
            "f32.neg" => Instruction::F32Neg,
            "f32.ceil" => Instruction::F32Ceil,
            "f32.floor" => Instruction::F32Floor,
            "f32.trunc" => Instruction::F32Trunc,
            "f32.nearest" => Instruction::F32Nearest,
            "f32.sqrt" => Instruction::F32Sqrt,
            "f32.add" => Instruction::F32Add,
            "f32.sub" => Instruction::F32Sub,
            "f32.mul" => Instruction::F32Mul,
            "f32.div" => Instruction::F32Div,
            "f32.min" => Instruction::F32Min,
            "f32.max" => Instruction::F32Max,
            "f32.copysign" => Instruction::F32Copysign,
            "f64.abs" => Instruction::F64Abs,
            "f64.neg" => Instruction::F64Neg,
            "f64.ceil" => Instruction::F64Ceil,
            "f64.floor" => Instruction::F64Floor,
            "f64.trunc" => Instruction::F64Trunc,
            "f64.nearest" => Instruction::F64Nearest,
            "f64.sqrt" => Instruction::F64Sqrt,
            "f64.add" => Instruction::F64Add,
            "f64.sub" => Instruction::F64Sub,
            "f64.mul" => Instruction::F64Mul,
            "f64.div" => Instruction::F64Div,
            "f64.min" => Instruction::F64Min,
            "f64.max" => Instruction::F64Max,
            "f64.copysign" => Instruction::F64Copysign,
            "i32.wrap_i64" => Instruction::I32WrapI64,
            "i32.trunc_f32_s" => Instruction::I32TruncF32S,
            "i32.trunc_f32_u" => Instruction::I32TruncF32U,
            "i32.trunc_f64_s" => Instruction::I32TruncF64S,
            "i32.trunc_f64_u" => Instruction::I32TruncF64U,
            "i64.extend_i32_s" => Instruction::I64ExtendI32S,
            "i64.extend_i32_u" => Instruction::I64ExtendI32U,
            "i64.trunc_f32_s" => Instruction::I64TruncF32S,
            "i64.trunc_f32_u" => Instruction::I64TruncF32U,
            "i64.trunc_f64_s" => Instruction::I64TruncF64S,
            "i64.trunc_f64_u" => Instruction::I64TruncF64U,
            "f32.convert_i32_s" => Instruction::F32ConvertI32S,
            "f32.convert_i32_u" => Instruction::F32ConvertI32U,
            "f32.convert_i64_s" => Instruction::F32ConvertI64S,
            "f32.convert_i64_u" => Instruction::F32ConvertI64U,
            "f32.demote_f64" => Instruction::F32DemoteF64,
            "f64.convert_i32_s" => Instruction::F64ConvertI32S,
            "f64.convert_i32_u" => Instruction::F64ConvertI32U,
            "f64.convert_i64_s" => Instruction::F64ConvertI64S,
            "f64.convert_i64_u" => Instruction::F64ConvertI64U,
            "f64.promote_f32" => Instruction::F64PromoteF32,
            "i32.reinterpret_f32" => Instruction::I32ReinterpretF32,
            "i64.reinterpret_f64" => Instruction::I64ReinterpretF64,
            "f32.reinterpret_i32" => Instruction::F32ReinterpretI32,
            "f64.reinterpret_i64" => Instruction::F64ReinterpretI64,
            _ => {
                self.parser.errors.push(Error::UnknownOperator { loc, name: name.to_string() });
                return None;
            }
        })
    }
}

fn parse_int_literal(s: &Sexpr) -> Option<i64> {
    let tok = s.as_keyword()?;
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("-0x")) {
        let neg = tok.starts_with('-');
        let v = i64::from_str_radix(hex, 16).ok()?;
        return Some(if neg { -v } else { v });
    }
    tok.parse::<i64>().ok()
}

fn parse_float_literal(s: &Sexpr) -> Option<f64> {
    let tok = s.as_keyword()?;
    match tok {
        "nan" | "+nan" => Some(f64::NAN),
        "-nan" => Some(-f64::NAN),
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => tok.parse::<f64>().ok(),
    }
}

// Re-export helpers used by `print.rs` to keep a single definition of the
// folded block/if grammar shape.
pub(crate) use self::control_lowering::lower_control_into;

mod control_lowering {
    use super::*;

    /// `block`/`loop`/`if` need their own lowering path since they emit more
    /// than one [`Instruction`] (the opener, the nested body, and the
    /// closer(s)); [`Lowering::lower_instruction`] only returns one.
    /// Folded into `Lowering::lower_sequence` by recognizing the three
    /// keywords before falling through to the single-instruction path.
    pub(crate) fn lower_control_into<'p, 'a, 'r>(l: &mut Lowering<'p, 'a, 'r>, out: &mut ByteWriter, name: &str, items: &'a [Sexpr<'a>], loc: Loc) -> bool {
        match name {
            "block" | "loop" => {
                let rest = &items[1..];
                let (label, rest) = leading_name(rest);
                let (result, consumed) = Lowering::result_annotation(rest);
                let body = &rest[consumed..];
                l.labels.push(LabelScope { result, name: label });
                let op = if name == "block" { Instruction::Block { result } } else { Instruction::Loop { result } };
                out.write_instruction(&op);
                l.lower_sequence(out, body);
                out.write_instruction(&Instruction::End);
                l.labels.pop();
                true
            }
            "if" => {
                let rest = &items[1..];
                let (label, rest) = leading_name(rest);
                let (result, consumed) = Lowering::result_annotation(rest);
                let rest = &rest[consumed..];
                let then_list = rest.iter().find_map(Sexpr::as_list).filter(|l| head(l) == Some("then"));
                let else_list = rest.iter().filter_map(Sexpr::as_list).find(|l| head(l) == Some("else"));
                l.labels.push(LabelScope { result, name: label });
                out.write_instruction(&Instruction::If { result });
                if let Some(then_items) = then_list {
                    l.lower_sequence(out, &then_items[1..]);
                } else {
                    l.parser.errors.push(Error::ExpectedKeyword { loc, expected: "then" });
                }
                if let Some(else_items) = else_list {
                    out.write_instruction(&Instruction::Else);
                    l.lower_sequence(out, &else_items[1..]);
                } else if result != ResultType::None {
                    l.parser.errors.push(Error::IfWithoutElse { loc });
                }
                out.write_instruction(&Instruction::End);
                l.labels.pop();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_identity_parses() {
        let (module, errors) = parse_module("(module (func))");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(module.funcs.len(), 1);
        assert_eq!(module.function_body_bytes(&module.funcs[0]), &[0x0b]);
    }

    #[test]
    fn f32_const_lowers_to_its_bit_pattern_not_a_truncated_integer() {
        let (module, errors) = parse_module("(module (func (result f32) (f32.const 1.5)))");
        assert!(errors.is_empty(), "{errors:?}");
        let bytes = module.function_body_bytes(&module.funcs[0]);
        let mut expected = alloc::vec![0x43u8];
        expected.extend_from_slice(&1.5f32.to_bits().to_le_bytes());
        expected.push(0x0b);
        assert_eq!(bytes, expected.as_slice());
    }

    #[test]
    fn const_plus_result_lowers_expected_bytes() {
        let (module, errors) = parse_module("(module (func (result i32) (i32.const 42)))");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(module.function_body_bytes(&module.funcs[0]), &[0x41, 0x2a, 0x0b]);
    }

    #[test]
    fn branch_with_argument_lowers() {
        let (module, errors) = parse_module("(module (func (result i32) (block (result i32) (i32.const 1) (br 0))))");
        assert!(errors.is_empty(), "{errors:?}");
        let bytes = module.function_body_bytes(&module.funcs[0]);
        assert_eq!(bytes, &[0x02, 0x7f, 0x41, 0x01, 0x0c, 0x00, 0x0b, 0x0b]);
    }

    #[test]
    fn named_locals_resolve_by_name() {
        let (module, errors) = parse_module("(module (func (param $x i32) (result i32) (local.get $x)))");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(module.function_body_bytes(&module.funcs[0]), &[0x20, 0x00, 0x0b]);
    }

    #[test]
    fn undefined_local_name_is_an_error() {
        let (_module, errors) = parse_module("(module (func (result i32) (local.get $missing)))");
        assert!(errors.iter().any(|e| matches!(e, Error::UndefinedName { kind: "local", .. })));
    }

    #[test]
    fn export_resolves_function_by_name() {
        let (module, errors) = parse_module(r#"(module (func $f (result i32) (i32.const 1)) (export "f" (func $f)))"#);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(module.exports.len(), 1);
        assert_eq!(module.exports[0].desc, ExportDesc::Func(FuncIdx::from_u32(0)));
    }

    #[test]
    fn inline_import_places_function_before_definitions() {
        let (module, errors) = parse_module(r#"(module (func (result i32) (i32.const 0)) (import "env" "f" (func (result i32))))"#);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(module.num_imported_funcs(), 1);
        assert_eq!(module.total_funcs(), 2);
    }

    #[test]
    fn well_typed_branch_with_argument_passes_validation() {
        let (module, errors) =
            parse_module("(module (func (result i32) (block (result i32) (i32.const 1) (br 0))))");
        assert!(errors.is_empty(), "{errors:?}");
        assert!(wasmgate_validate::validate(&module).is_empty());
    }

    #[test]
    fn dropping_the_branch_argument_fails_validation_with_stack_underflow() {
        let (module, errors) = parse_module("(module (func (result i32) (block (result i32) (br 0))))");
        assert!(errors.is_empty(), "{errors:?}");
        let validation_errors = wasmgate_validate::validate(&module);
        assert!(validation_errors
            .iter()
            .any(|e| matches!(e, wasmgate_validate::Error::StackUnderflow { .. })));
    }

    #[test]
    fn mismatched_result_type_fails_validation_with_type_mismatch() {
        let (module, errors) = parse_module("(module (func (result i32) (f32.const 1.0)))");
        assert!(errors.is_empty(), "{errors:?}");
        let validation_errors = wasmgate_validate::validate(&module);
        assert!(validation_errors
            .iter()
            .any(|e| matches!(e, wasmgate_validate::Error::TypeMismatch { .. })));
    }
}
