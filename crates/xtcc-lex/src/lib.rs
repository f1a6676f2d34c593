//! xtcc-lex - Lexical analysis for the xtcc C subset.
//!
//! This crate turns a source buffer into a stream of [`Token`]s, one at a
//! time. The language is line-oriented C without a preprocessor: keywords,
//! identifiers, decimal/hex/octal integers, character and string literals
//! with a small escape set, multi-character operators, and `//` comments.
//!
//! The lexer tracks the current line number and a running token count; both
//! feed the driver's end-of-build report.

pub mod cursor;
pub mod error;
pub mod lexer;
pub mod token;

pub use error::{LexError, Result};
pub use lexer::Lexer;
pub use token::Token;
