//! Error types for lexical analysis.

use thiserror::Error;

/// Error type for lexical analysis.
///
/// The first lexical error aborts the compilation; there is no recovery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    /// A string literal ran off the end of the source.
    #[error("Line {line}: unterminated string literal")]
    UnterminatedString { line: u32 },

    /// A byte that starts no token of the language.
    #[error("Line {line}: unexpected character '{ch}'")]
    UnexpectedChar { line: u32, ch: char },
}

/// Result type alias for lexer operations.
pub type Result<T> = std::result::Result<T, LexError>;
