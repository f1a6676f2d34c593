//! xtcc-gen - Single-pass parser and Xtensa code generator.
//!
//! There is no AST: the recursive-descent parser in [`parser`] emits Xtensa
//! machine code into a byte buffer as each production is recognized. Wide
//! immediates, string pointers, global addresses and function references are
//! routed through the deduplicated literal pool in [`lits`]; every `L32R`
//! emission records a patch site so the object writer can resolve the
//! PC-relative displacement once the final layout is known.
//!
//! The result of a compilation is a [`CompiledUnit`], consumed by the
//! `xtcc-obj` ELF writer.

pub mod asm;
pub mod error;
pub mod lits;
pub mod parser;
pub mod syms;
pub mod ty;

pub use error::{CodeGenError, Result};
pub use lits::{LitKind, LitPool, Patch};
pub use parser::{compile, CompiledUnit, Compiler};
pub use syms::{Func, FuncTable, Var, VarTable};
pub use ty::Ty;
