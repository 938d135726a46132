//! Prints a [`Module`] back to indented WAST text.
//!
//! The inverse of `parse.rs`: walks each index space in order, decoding
//! function bodies on demand via the shared operator table (the same
//! share-nothing-but-the-table design as the validator and encoder), and
//! falling back to [`Gensym`] for any name not present in the module's
//! [`ModuleNames`] (or for table/memory/global/type positions, which never
//! carry one; only function and local names round-trip through the binary
//! format).

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use hashbrown::HashMap;

use wasmgate_decode::BinaryReader;
use wasmgate_ir::{ExportDesc, Instruction, Module};
use wasmgate_types::{ElementType, FunctionType, GlobalType, Mutability, ResultType, SizeConstraint, ValueType};

use crate::gensym::Gensym;

const INDENT: &str = "  ";

struct Printer<'m> {
    module: &'m Module,
    out: String,
    depth: usize,
    gensym: Gensym,
    func_names: HashMap<u32, &'m str>,
    local_names: HashMap<u32, HashMap<u32, &'m str>>,
}

/// Print `module` as a single `(module ...)` s-expression, two-space
/// indented, one form per line.
pub fn print_module(module: &Module) -> String {
    let mut func_names = HashMap::new();
    let mut local_names = HashMap::new();
    if let Some(names) = &module.names {
        for (idx, name) in &names.function_names {
            func_names.insert(idx.as_u32(), name.as_str());
        }
        for (idx, locals) in &names.local_names {
            let map = local_names.entry(idx.as_u32()).or_insert_with(HashMap::new);
            for (local_idx, name) in locals {
                map.insert(local_idx.as_u32(), name.as_str());
            }
        }
    }
    let mut p = Printer {
        module,
        out: String::new(),
        depth: 0,
        gensym: Gensym::default(),
        func_names,
        local_names,
    };
    p.print_module();
    p.out
}

impl<'m> Printer<'m> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.depth += 1;
    }

    fn close(&mut self, text: &str) {
        self.depth -= 1;
        self.line(text);
    }

    /// Name for function `idx` without the leading `$` (callers add it).
    fn func_name(&mut self, idx: u32) -> String {
        match self.func_names.get(&idx) {
            Some(n) => (*n).to_string(),
            None => self.gensym.next("func").trim_start_matches('$').to_string(),
        }
    }

    fn print_module(&mut self) {
        self.open("(module");
        self.print_types();
        self.print_imports();
        self.print_tables();
        self.print_memories();
        self.print_globals();
        self.print_funcs();
        self.print_exports();
        self.print_start();
        self.print_elements();
        self.print_data();
        self.close(")");
    }

    fn print_value_type(ty: ValueType) -> &'static str {
        ty.name()
    }

    fn print_func_type(ty: &FunctionType) -> String {
        let mut s = String::new();
        for p in ty.params() {
            s.push_str(&format!(" (param {})", Self::print_value_type(*p)));
        }
        if let ResultType::Value(v) = ty.result() {
            s.push_str(&format!(" (result {})", Self::print_value_type(v)));
        }
        s
    }

    fn print_limits(limits: &SizeConstraint) -> String {
        match limits.max {
            Some(max) => format!("{} {}", limits.min, max),
            None => format!("{}", limits.min),
        }
    }

    fn print_global_type(ty: GlobalType) -> String {
        match ty.mutability {
            Mutability::Const => Self::print_value_type(ty.value).to_string(),
            Mutability::Var => format!("(mut {})", Self::print_value_type(ty.value)),
        }
    }

    fn print_types(&mut self) {
        for ty in &self.module.types {
            self.line(&format!("(type (func{}))", Self::print_func_type(ty)));
        }
    }

    fn print_imports(&mut self) {
        for imp in &self.module.imports {
            let desc = match &imp.desc {
                wasmgate_ir::ImportDesc::Func(t) => format!("(func (type {}))", t.as_u32()),
                wasmgate_ir::ImportDesc::Table(t) => format!(
                    "(table {} {})",
                    Self::print_limits(&t.limits),
                    match t.element {
                        ElementType::FuncRef => "anyfunc",
                    }
                ),
                wasmgate_ir::ImportDesc::Memory(t) => format!("(memory {})", Self::print_limits(&t.limits)),
                wasmgate_ir::ImportDesc::Global(t) => format!("(global {})", Self::print_global_type(*t)),
            };
            self.line(&format!("(import {:?} {:?} {})", imp.module, imp.name, desc));
        }
    }

    fn print_tables(&mut self) {
        for t in &self.module.tables {
            self.line(&format!(
                "(table {} {})",
                Self::print_limits(&t.limits),
                match t.element {
                    ElementType::FuncRef => "anyfunc",
                }
            ));
        }
    }

    fn print_memories(&mut self) {
        for m in &self.module.mems {
            self.line(&format!("(memory {})", Self::print_limits(&m.limits)));
        }
    }

    fn print_globals(&mut self) {
        let imported = self.module.num_imported_globals();
        for (i, g) in self.module.globals.iter().enumerate() {
            let init = self.print_const_expr(&g.init);
            self.line(&format!("(global {} {})", Self::print_global_type(g.ty), init));
            let _ = imported + i;
        }
    }

    fn print_const_expr(&mut self, expr: &wasmgate_ir::ConstExpr) -> String {
        match expr.instructions.first() {
            Some(Instruction::I32Const { value }) => format!("(i32.const {value})"),
            Some(Instruction::I64Const { value }) => format!("(i64.const {value})"),
            Some(Instruction::F32Const { bits }) => format!("(f32.const {})", f32::from_bits(*bits)),
            Some(Instruction::F64Const { bits }) => format!("(f64.const {})", f64::from_bits(*bits)),
            Some(Instruction::GlobalGet { global }) => format!("(global.get {})", self.global_ref(global.as_u32())),
            _ => "(i32.const 0)".to_string(),
        }
    }

    fn global_ref(&mut self, idx: u32) -> String {
        format!("{idx}")
    }

    fn print_funcs(&mut self) {
        let imported = self.module.num_imported_funcs() as u32;
        for (i, f) in self.module.funcs.iter().enumerate() {
            let idx = imported + i as u32;
            let name = self.func_name(idx);
            let ty = &self.module.types[f.type_idx.as_u32() as usize];
            let mut header = format!("(func ${name}");
            for (pi, p) in ty.params().iter().enumerate() {
                let pname = self.local_name(idx, pi as u32);
                header.push_str(&format!(" (param {pname} {})", Self::print_value_type(*p)));
            }
            if let ResultType::Value(v) = ty.result() {
                header.push_str(&format!(" (result {})", Self::print_value_type(v)));
            }
            self.open(&header);
            let param_count = ty.params().len() as u32;
            for (li, local_ty) in f.locals.iter().enumerate() {
                let lname = self.local_name(idx, param_count + li as u32);
                self.line(&format!("(local {lname} {})", Self::print_value_type(*local_ty)));
            }
            let bytes = self.module.function_body_bytes(f);
            self.print_body(bytes, idx);
            self.close(")");
        }
    }

    fn local_name(&mut self, func_idx: u32, local_idx: u32) -> String {
        if let Some(map) = self.local_names.get(&func_idx) {
            if let Some(name) = map.get(&local_idx) {
                return format!("${name}");
            }
        }
        local_idx.to_string()
    }

    /// Decode and print one function body's operator stream as a flat
    /// sequence of folded forms, re-indenting at each `block`/`loop`/`if`
    /// and dedenting at the matching `end`/`else`.
    fn print_body(&mut self, bytes: &[u8], func_idx: u32) {
        let mut r = BinaryReader::new(bytes);
        let mut depth_stack: Vec<bool> = Vec::new();
        while let Ok(instr) = r.read_instruction() {
            match &instr {
                Instruction::End => {
                    if depth_stack.pop().is_some() {
                        self.depth -= 1;
                        self.line(")");
                    }
                }
                Instruction::Else => {
                    self.depth -= 1;
                    self.line(") (else");
                    self.depth += 1;
                }
                Instruction::Block { result } => {
                    self.line(&format!("(block{}", Self::result_suffix(*result)));
                    self.depth += 1;
                    depth_stack.push(true);
                }
                Instruction::Loop { result } => {
                    self.line(&format!("(loop{}", Self::result_suffix(*result)));
                    self.depth += 1;
                    depth_stack.push(true);
                }
                Instruction::If { result } => {
                    self.line(&format!("(if{} (then", Self::result_suffix(*result)));
                    self.depth += 1;
                    depth_stack.push(true);
                }
                other => self.print_plain_instruction(other, func_idx),
            }
        }
    }

    fn result_suffix(result: ResultType) -> String {
        match result {
            ResultType::None => String::new(),
            ResultType::Value(v) => format!(" (result {})", Self::print_value_type(v)),
        }
    }

    fn print_plain_instruction(&mut self, instr: &Instruction, func_idx: u32) {
        let text = match instr {
            Instruction::Call { func } => format!("(call {})", self.func_ref_text(func.as_u32())),
            Instruction::CallIndirect { ty, .. } => format!("(call_indirect (type {}))", ty.as_u32()),
            Instruction::Br { depth } => format!("(br {})", depth.as_u32()),
            Instruction::BrIf { depth } => format!("(br_if {})", depth.as_u32()),
            Instruction::BrTableOp { table } => {
                let mut s = "(br_table".to_string();
                for t in &table.targets {
                    s.push_str(&format!(" {}", t.as_u32()));
                }
                s.push_str(&format!(" {})", table.default.as_u32()));
                s
            }
            Instruction::LocalGet { local } => format!("(local.get {})", self.local_name(func_idx, local.as_u32())),
            Instruction::LocalSet { local } => format!("(local.set {})", self.local_name(func_idx, local.as_u32())),
            Instruction::LocalTee { local } => format!("(local.tee {})", self.local_name(func_idx, local.as_u32())),
            Instruction::GlobalGet { global } => format!("(global.get {})", self.global_ref(global.as_u32())),
            Instruction::GlobalSet { global } => format!("(global.set {})", self.global_ref(global.as_u32())),
            Instruction::I32Const { value } => format!("(i32.const {value})"),
            Instruction::I64Const { value } => format!("(i64.const {value})"),
            Instruction::F32Const { bits } => format!("(f32.const {})", f32::from_bits(*bits)),
            Instruction::F64Const { bits } => format!("(f64.const {})", f64::from_bits(*bits)),
            other => {
                if let Some((memarg, _, _)) = other.memory_access() {
                    let mut s = format!("({}", other.name());
                    if memarg.offset != 0 {
                        s.push_str(&format!(" offset={}", memarg.offset));
                    }
                    s.push_str(&format!(" align={})", 1u32 << memarg.align));
                    s
                } else {
                    format!("({})", other.name())
                }
            }
        };
        self.line(&text);
    }

    fn func_ref_text(&mut self, idx: u32) -> String {
        format!("${}", self.func_name(idx))
    }

    fn print_exports(&mut self) {
        for e in &self.module.exports {
            let desc = match &e.desc {
                ExportDesc::Func(i) => format!("(func {})", self.func_ref_text(i.as_u32())),
                ExportDesc::Table(i) => format!("(table {})", i.as_u32()),
                ExportDesc::Memory(i) => format!("(memory {})", i.as_u32()),
                ExportDesc::Global(i) => format!("(global {})", i.as_u32()),
            };
            self.line(&format!("(export {:?} {})", e.name, desc));
        }
    }

    fn print_start(&mut self) {
        if let Some(idx) = self.module.start {
            self.line(&format!("(start {})", self.func_ref_text(idx.as_u32())));
        }
    }

    fn print_elements(&mut self) {
        for e in &self.module.elements {
            let offset = self.print_const_expr(&e.offset);
            let mut s = format!("(elem (table {}) {offset}", e.table.as_u32());
            for f in &e.funcs {
                s.push_str(&format!(" {}", self.func_ref_text(f.as_u32())));
            }
            s.push(')');
            self.line(&s);
        }
    }

    fn print_data(&mut self) {
        for d in &self.module.data {
            let offset = self.print_const_expr(&d.offset);
            self.line(&format!("(data (memory {}) {offset} {:?})", d.memory.as_u32(), String::from_utf8_lossy(&d.bytes)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_module;

    #[test]
    fn prints_minimal_function() {
        let (module, errors) = parse_module("(module (func))");
        assert!(errors.is_empty());
        let text = print_module(&module);
        assert!(text.contains("(module"));
        assert!(text.contains("(func $func0)") || text.contains("(func $func0"));
    }

    #[test]
    fn prints_named_export() {
        let (module, errors) = parse_module(r#"(module (func $f (result i32) (i32.const 1)) (export "f" (func $f)))"#);
        assert!(errors.is_empty());
        let text = print_module(&module);
        assert!(text.contains("(export \"f\" (func $f))"));
    }

    #[test]
    fn prints_block_with_indentation() {
        let (module, errors) = parse_module("(module (func (result i32) (block (result i32) (i32.const 1) (br 0))))");
        assert!(errors.is_empty());
        let text = print_module(&module);
        assert!(text.contains("(block (result i32)"));
        assert!(text.contains("(br 0)"));
    }
}
