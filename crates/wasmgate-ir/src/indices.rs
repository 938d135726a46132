//! Index-space newtypes, one per WebAssembly index space.
//!
//! Built on `cranelift_entity::entity_impl!` so these are usable directly as
//! `PrimaryMap`/`SecondaryMap` keys, matching the convention the rest of the
//! pipeline's host codebase uses for every other index-like id.

use cranelift_entity::entity_impl;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdx(u32);
entity_impl!(TypeIdx, "type");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncIdx(u32);
entity_impl!(FuncIdx, "func");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIdx(u32);
entity_impl!(TableIdx, "table");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemIdx(u32);
entity_impl!(MemIdx, "memory");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalIdx(u32);
entity_impl!(GlobalIdx, "global");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElemIdx(u32);
entity_impl!(ElemIdx, "elem");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataIdx(u32);
entity_impl!(DataIdx, "data");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalIdx(u32);
entity_impl!(LocalIdx, "local");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelIdx(u32);
entity_impl!(LabelIdx, "label");
