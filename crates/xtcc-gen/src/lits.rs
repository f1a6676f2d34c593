//! Literal pool and `L32R` patch list.
//!
//! Xtensa has no 32-bit immediate form: every wide constant is loaded
//! PC-relative from a pool that the object writer places in front of the
//! code. The pool deduplicates on `(value, kind)` - two loads of the same
//! constant share one slot - and every emitted `L32R` records a patch entry
//! so its 16-bit displacement field can be computed once the final file
//! layout is known.

use indexmap::IndexSet;

/// What a literal slot's 32-bit value means to the object writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LitKind {
    /// Plain immediate; emitted as-is, no relocation.
    Int,
    /// Offset into `.rodata`; relocated with `R_XTENSA_RELATIVE`.
    Str,
    /// Index into the function table; resolves to the function's in-file
    /// address (`R_XTENSA_RELATIVE`) or, for undefined functions, to an
    /// `R_XTENSA_JMP_SLOT` against the symbol.
    Func,
    /// Offset into `.bss`; relocated with `R_XTENSA_RELATIVE`.
    Bss,
}

/// One `L32R` emission site awaiting displacement resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    /// Byte offset of the `L32R` instruction within the code buffer.
    pub code_off: usize,
    /// Index of the literal slot it loads.
    pub lit: usize,
}

/// Deduplicating literal pool plus the `L32R` use list.
#[derive(Debug, Default)]
pub struct LitPool {
    entries: IndexSet<(i32, LitKind)>,
    patches: Vec<Patch>,
}

impl LitPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot index for `(value, kind)`, allocating one on first
    /// use. Slot order is first-use order, which fixes the pool's layout in
    /// the output file.
    pub fn intern(&mut self, value: i32, kind: LitKind) -> usize {
        self.entries.insert_full((value, kind)).0
    }

    /// Records that the `L32R` at `code_off` loads slot `lit`.
    pub fn record_use(&mut self, code_off: usize, lit: usize) {
        self.patches.push(Patch { code_off, lit });
    }

    /// Number of allocated slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    /// Consumes the pool into plain slot and patch vectors.
    pub fn into_parts(self) -> (Vec<(i32, LitKind)>, Vec<Patch>) {
        (self.entries.into_iter().collect(), self.patches)
    }
}
