//! Error types for parsing and code generation.
//!
//! Every error is fatal: the compiler stops at the first one (no recovery,
//! no continuation). The `Display` text is the diagnostic body; the driver
//! prefixes `Error: ` when printing.

use thiserror::Error;
use xtcc_lex::LexError;

/// Error type for parsing and code generation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeGenError {
    /// The parser required one token and saw another.
    #[error("Line {line}: expected {expected}, got {found}")]
    UnexpectedToken {
        line: u32,
        expected: String,
        found: String,
    },

    /// A token that cannot start an expression.
    #[error("Line {line}: unexpected {found} at start of expression")]
    ExpectedExpression { line: u32, found: String },

    /// A name that resolves to neither a variable nor an enum constant.
    #[error("Line {line}: undefined identifier '{name}'")]
    UndefinedIdent { line: u32, name: String },

    /// A global array size referenced a name that is not an enum constant.
    #[error("Line {line}: undefined constant '{name}' in array size")]
    UndefinedConst { line: u32, name: String },

    /// A global array declaration without a usable size expression.
    #[error("Line {line}: array size expected")]
    ArraySizeExpected { line: u32 },

    /// More call arguments than the windowed ABI mapping supports.
    #[error("Line {line}: call exceeds the supported maximum of 5 arguments")]
    TooManyArgs { line: u32 },

    /// Local declarations outgrew the per-function stack area.
    #[error("Line {line}: function locals exceed the 512-byte frame area")]
    FrameTooLarge { line: u32 },

    /// A lexical error surfaced while fetching the next token.
    #[error(transparent)]
    Lex(#[from] LexError),
}

/// Result type alias for code generation operations.
pub type Result<T> = std::result::Result<T, CodeGenError>;
