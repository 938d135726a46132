//! The `std`-enabled facade over the module pipeline: re-exports every
//! pipeline crate and wires the two pipelines this workspace exists to
//! support: decode then validate a binary module, and parse WAST text
//! through validation to the printer. This is the crate an external CLI,
//! JIT, or host embedder actually depends on; every other crate in the
//! workspace is `no_std` and talks in borrowed slices and byte offsets.

pub use wasmgate_decode as decode;
pub use wasmgate_encode as encode;
pub use wasmgate_ir as ir;
pub use wasmgate_names as names;
pub use wasmgate_types as types;
pub use wasmgate_validate as validate;
pub use wasmgate_wast as wast;

pub use wasmgate_ir::Module;

/// A binary module that decoded successfully but failed validation.
///
/// Kept distinct from [`Error`] so callers that want the module anyway (to
/// print a partially-valid module for diagnostics, say) can still get at it.
#[derive(Debug)]
pub struct Invalid {
    pub module: Module,
    pub errors: Vec<wasmgate_validate::Error>,
}

impl core::fmt::Display for Invalid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "module failed validation with {} error(s)", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n  {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Invalid {}

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    #[error("{0}")]
    Decode(#[from] wasmgate_decode::Error),
    #[error("{0}")]
    Invalid(#[from] Invalid),
}

/// Decode a binary module and validate it, in one step.
///
/// Returns [`Error::Decode`] if the bytes aren't well-formed, or
/// [`Error::Invalid`] (carrying the decoded module and every validation
/// error found) if they decode but don't type-check.
pub fn decode_and_validate(bytes: &[u8]) -> Result<Module, Error> {
    log::debug!("decoding module, {} bytes", bytes.len());
    let module = wasmgate_decode::decode_module(bytes)?;
    let errors = wasmgate_validate::validate(&module);
    if errors.is_empty() {
        Ok(module)
    } else {
        log::debug!("module failed validation with {} error(s)", errors.len());
        Err(Invalid { module, errors }.into())
    }
}

/// Parse WAST source text into a module, validate it, and print the result
/// back to indented text.
///
/// Parse errors and validation errors are independent failure modes with no
/// natural common variant (a parse error has a source locus, a validation
/// error a byte offset into the re-encoded body), so both are handed back
/// to the caller directly rather than folded into one `Error` type.
pub fn parse_validate_print(src: &str) -> Result<String, ParseValidateError> {
    log::debug!("parsing {} bytes of WAST source", src.len());
    let (module, parse_errors) = wasmgate_wast::parse_module(src);
    if !parse_errors.is_empty() {
        return Err(ParseValidateError::Parse(parse_errors));
    }
    let validate_errors = wasmgate_validate::validate(&module);
    if !validate_errors.is_empty() {
        return Err(ParseValidateError::Invalid(validate_errors));
    }
    Ok(wasmgate_wast::print_module(&module))
}

#[derive(Debug, onlyerror::Error)]
pub enum ParseValidateError {
    #[error("{} parse error(s), first: {}", .0.len(), .0[0])]
    Parse(Vec<wasmgate_wast::Error>),
    #[error("{} validation error(s), first: {}", .0.len(), .0[0])]
    Invalid(Vec<wasmgate_validate::Error>),
}

/// Round-trip a binary module through the encoder: decode, validate, then
/// re-encode the same [`Module`]. Useful as a sanity check that the encoder
/// and decoder agree on the wire format for a given input.
pub fn decode_validate_encode(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let module = decode_and_validate(bytes)?;
    Ok(wasmgate_encode::encode_module(&module))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_identity_module_bytes() -> Vec<u8> {
        let module = Module::new();
        wasmgate_encode::encode_module(&module)
    }

    #[test]
    fn decode_and_validate_accepts_the_empty_module() {
        let bytes = minimal_identity_module_bytes();
        let module = decode_and_validate(&bytes).unwrap();
        assert!(module.types.is_empty());
    }

    #[test]
    fn decode_and_validate_rejects_truncated_input() {
        let err = decode_and_validate(&[0x00, 0x61, 0x73]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn decode_and_validate_surfaces_invalid_modules() {
        let mut module = Module::new();
        module.start = Some(wasmgate_ir::FuncIdx::from_u32(0));
        let bytes = wasmgate_encode::encode_module(&module);

        match decode_and_validate(&bytes) {
            Err(Error::Invalid(invalid)) => {
                assert!(!invalid.errors.is_empty());
            }
            other => panic!("expected Error::Invalid, got {other:?}"),
        }
    }

    #[test]
    fn parse_validate_print_round_trips_a_minimal_function() {
        let src = r#"(module (func $f (result i32) (i32.const 1)))"#;
        let printed = parse_validate_print(src).unwrap();
        assert!(printed.contains("func"));
        assert!(printed.contains("i32.const"));
    }

    #[test]
    fn parse_validate_print_surfaces_type_errors() {
        let src = r#"(module (func $f (result i32)))"#;
        let err = parse_validate_print(src).unwrap_err();
        assert!(matches!(err, ParseValidateError::Invalid(_)));
    }
}
