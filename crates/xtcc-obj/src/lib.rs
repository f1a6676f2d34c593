//! xtcc-obj - ELF32 relocatable object writer for Xtensa.
//!
//! Takes a [`xtcc_gen::CompiledUnit`] and produces the complete object file
//! image: literal pool and code in `.text`, string data in `.rodata`, a
//! NOBITS `.bss`, relocations the downstream linker needs to finish the
//! job, and the symbol/string tables. `L32R` displacements are resolved
//! here, because only the writer knows the final distance between each
//! instruction and its literal slot.

pub mod elf;
pub mod error;

pub use elf::build_object;
pub use error::{ObjError, Result};
