//! Errors carrying a source locus rather than a byte offset, covering the
//! lexer, the two-pass module parser, and operator lowering. Multiple errors
//! can accumulate in one parse run (see [`crate::parse`]).

extern crate alloc;

use alloc::string::String;

use crate::lexer::Loc;

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    #[error("{loc:?}: unexpected end of input")]
    UnexpectedEof { loc: Loc },
    #[error("{loc:?}: unclosed list")]
    UnclosedList { loc: Loc },
    #[error("{loc:?}: unexpected ')'")]
    UnexpectedCloseParen { loc: Loc },
    #[error("{loc:?}: unterminated string literal")]
    UnterminatedString { loc: Loc },
    #[error("{loc:?}: invalid escape sequence")]
    BadEscape { loc: Loc },
    #[error("{loc:?}: unterminated block comment")]
    UnterminatedComment { loc: Loc },
    #[error("{loc:?}: unexpected character")]
    UnexpectedCharacter { loc: Loc },
    #[error("{loc:?}: trailing input after the first s-expression")]
    TrailingInput { loc: Loc },

    #[error("{loc:?}: expected '{expected}'")]
    ExpectedKeyword { loc: Loc, expected: &'static str },
    #[error("{loc:?}: expected an s-expression list")]
    ExpectedList { loc: Loc },
    #[error("{loc:?}: expected a string literal")]
    ExpectedString { loc: Loc },
    #[error("{loc:?}: expected a value type")]
    ExpectedValueType { loc: Loc },
    #[error("{loc:?}: expected an integer literal")]
    ExpectedInteger { loc: Loc },
    #[error("{loc:?}: unknown operator {name:?}")]
    UnknownOperator { loc: Loc, name: String },
    #[error("{loc:?}: duplicate {kind} name {name:?}")]
    DuplicateName { loc: Loc, kind: &'static str, name: String },
    #[error("{loc:?}: undefined {kind} {name:?}")]
    UndefinedName { loc: Loc, kind: &'static str, name: String },
    #[error("{loc:?}: {kind} index {index} out of range")]
    BadIndex { loc: Loc, kind: &'static str, index: u32 },
    #[error("{loc:?}: `if` without `else` must have an empty result type")]
    IfWithoutElse { loc: Loc },
    #[error("{loc:?}: br_table targets disagree on branch argument type")]
    BrTableMismatch { loc: Loc },
    #[error("module has more than one start section")]
    MultipleStarts { loc: Loc },
}

pub type Result<T> = core::result::Result<T, Error>;
