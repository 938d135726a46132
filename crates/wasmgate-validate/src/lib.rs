//! Static validation of a decoded or parsed [`wasmgate_ir::Module`]: a
//! declarative module pass over index spaces and initializers, followed by
//! an independent per-function body pass that type-checks each function's
//! operator stream.
//!
//! Both passes accumulate every error they find rather than stopping at the
//! first one: the module pass keeps checking every export/segment/global
//! after a failure, and the body pass moves on to the next function after a
//! failure in the current one.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod body_pass;
mod error;
mod module_pass;

use alloc::vec::Vec;

use wasmgate_ir::{FuncIdx, Module};

pub use error::{Error, IndexKind, Result};

/// Validate a whole module, returning every error found.
///
/// An empty result means the module is well-formed. The
/// module pass runs first; the body pass then runs once per function,
/// independent of whether earlier functions (or the module pass) failed.
pub fn validate(module: &Module) -> Vec<Error> {
    let mut errors = Vec::new();
    module_pass::validate_module(module, &mut errors);

    let imported = module.num_imported_funcs();
    for (i, def) in module.funcs.iter().enumerate() {
        let func_idx = FuncIdx::from_u32((imported + i) as u32);
        body_pass::validate_body(module, func_idx, def, &mut errors);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmgate_ir::TypeIdx;
    use wasmgate_types::{FunctionType, ResultType};

    #[test]
    fn empty_module_validates_cleanly() {
        assert!(validate(&Module::new()).is_empty());
    }

    #[test]
    fn module_and_body_errors_both_surface() {
        let mut module = Module::new();
        module.types.push(FunctionType::new(Vec::new(), ResultType::None));
        module.funcs.push(wasmgate_ir::FunctionDef {
            type_idx: TypeIdx::from_u32(0),
            locals: Vec::new(),
            code_offset: 0,
            code_len: 1,
        });
        module.code.push(0x0b);
        // start references a function that doesn't exist.
        module.start = Some(FuncIdx::from_u32(5));

        let errors = validate(&module);
        assert!(errors.iter().any(|e| matches!(e, Error::BadIndex { .. })));
    }
}
