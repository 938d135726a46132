//! Value, function, table, memory and global types shared by every stage of
//! the module pipeline.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use hashbrown::HashMap;

/// The upper bound on a memory's size constraint, in 64 KiB pages.
pub const MAX_MEMORY_PAGES: u32 = 65536;
/// The upper bound on a table's size constraint, in elements.
pub const MAX_TABLE_ELEMENTS: u32 = u32::MAX;

/// A WebAssembly value type.
///
/// This is the MVP set only: no `v128`, `funcref`, or `externref` value on
/// the operand stack, matching the data model's single-memory/single-table,
/// no-reference-types scope.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub const ALL: [ValueType; 4] = [ValueType::I32, ValueType::I64, ValueType::F32, ValueType::F64];

    /// The canonical textual name used by the printer and in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        }
    }
}

impl core::fmt::Display for ValueType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// The result a function or control frame produces: at most one value.
///
/// The data model explicitly forbids multi-value returns.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResultType {
    None,
    Value(ValueType),
}

impl ResultType {
    /// Number of values this result type leaves on the stack: 0 or 1.
    pub fn arity(self) -> u32 {
        match self {
            ResultType::None => 0,
            ResultType::Value(_) => 1,
        }
    }

    /// Narrow a result type to a concrete value type, if it has one.
    pub fn as_value(self) -> Option<ValueType> {
        match self {
            ResultType::None => None,
            ResultType::Value(v) => Some(v),
        }
    }

    /// Widen a value type into a single-value result type.
    pub fn from_value(value: ValueType) -> Self {
        ResultType::Value(value)
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultType::None => "",
            ResultType::Value(v) => v.name(),
        }
    }
}

impl From<ValueType> for ResultType {
    fn from(value: ValueType) -> Self {
        ResultType::Value(value)
    }
}

/// The element type a table may hold. The data model admits only the
/// `anyfunc` tag; this is still an enum (rather than a unit struct) so the
/// decoder and printer have a tag to range-check and name the same way the
/// element-type byte does in the binary format.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ElementType {
    FuncRef,
}

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::FuncRef => "anyfunc",
        }
    }
}

/// A `{ min, max }` bound, shared by table and memory types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SizeConstraint {
    pub min: u32,
    pub max: Option<u32>,
}

impl SizeConstraint {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// `min <= max` (when bounded) and both are within `cap`.
    pub fn validate(&self, cap: u32) -> bool {
        if self.min > cap {
            return false;
        }
        match self.max {
            Some(max) => self.min <= max && max <= cap,
            None => true,
        }
    }

    /// Is `self` a subset of `other`: narrower minimum, narrower (or equal)
    /// maximum. Used when checking an imported type against its declared
    /// expectation.
    pub fn subset(&self, other: &SizeConstraint) -> bool {
        if self.min < other.min {
            return false;
        }
        match (self.max, other.max) {
            (_, None) => true,
            (Some(a), Some(b)) => a <= b,
            (None, Some(_)) => false,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TableType {
    pub element: ElementType,
    pub limits: SizeConstraint,
}

impl TableType {
    pub fn validate(&self) -> bool {
        self.limits.validate(MAX_TABLE_ELEMENTS)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MemoryType {
    pub limits: SizeConstraint,
}

impl MemoryType {
    pub fn validate(&self) -> bool {
        self.limits.validate(MAX_MEMORY_PAGES)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Mutability {
    Const,
    Var,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct GlobalType {
    pub value: ValueType,
    pub mutability: Mutability,
}

/// A function signature: an ordered parameter list plus a single result.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FunctionType {
    params: Vec<ValueType>,
    result: ResultType,
}

impl FunctionType {
    pub fn new(params: Vec<ValueType>, result: ResultType) -> Self {
        Self { params, result }
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn result(&self) -> ResultType {
        self.result
    }
}

/// A newtype index into a [`FunctionTypeInterner`], distinct from the
/// module-level `TypeIdx` index space (a module may declare types that are
/// never deduplicated against one another; the interner is purely an
/// implementation convenience for producers that want identity equality).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FunctionTypeId(u32);

/// Canonicalizes function types so that equality reduces to identity.
///
/// Scoped per-module rather than global: two `Module`s built independently
/// do not share an interner, avoiding any cross-thread synchronization in
/// the common case (see the concurrency notes on why a shared interner
/// would need a lock).
#[derive(Debug, Default)]
pub struct FunctionTypeInterner {
    types: Vec<FunctionType>,
    by_shape: HashMap<FunctionType, FunctionTypeId>,
}

impl FunctionTypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, ty: FunctionType) -> FunctionTypeId {
        if let Some(&id) = self.by_shape.get(&ty) {
            return id;
        }
        let id = FunctionTypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.by_shape.insert(ty, id);
        id
    }

    pub fn get(&self, id: FunctionTypeId) -> &FunctionType {
        &self.types[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_constraint_boundaries() {
        assert!(SizeConstraint::new(1, Some(1)).validate(10));
        assert!(!SizeConstraint::new(2, Some(1)).validate(10));
        assert!(SizeConstraint::new(0, Some(10)).validate(10));
        assert!(!SizeConstraint::new(0, Some(11)).validate(10));
    }

    #[test]
    fn result_type_arity() {
        assert_eq!(ResultType::None.arity(), 0);
        assert_eq!(ResultType::Value(ValueType::I32).arity(), 1);
    }

    #[test]
    fn interner_dedupes_identical_shapes() {
        let mut interner = FunctionTypeInterner::new();
        let a = interner.intern(FunctionType::new(
            alloc::vec![ValueType::I32],
            ResultType::Value(ValueType::I32),
        ));
        let b = interner.intern(FunctionType::new(
            alloc::vec![ValueType::I32],
            ResultType::Value(ValueType::I32),
        ));
        let c = interner.intern(FunctionType::new(alloc::vec![ValueType::I64], ResultType::None));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.len(), 2);
    }
}
