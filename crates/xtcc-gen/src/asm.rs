//! Xtensa instruction encoder.
//!
//! Exactly the instruction subset the code generator needs, encoded straight
//! into a growable byte buffer. Instructions are 3 bytes (wide) or 2 bytes
//! (narrow `.N` forms), little-endian within the instruction word.
//!
//! Forward branches are emitted with a zero displacement and fixed up later:
//! callers remember the emission offset and call [`CodeBuf::patch_beqz`] /
//! [`CodeBuf::patch_jump`] once the target is the current end of code.
//! `L32R` displacements are not handled here at all; they stay zero until
//! the object writer knows the final literal-pool layout.

/// Stack pointer (`a1`).
pub const SP_REG: u8 = 1;
/// Expression result / accumulator (`a8`).
pub const RES_REG: u8 = 8;
/// Scratch register (`a9`).
pub const TMP_REG: u8 = 9;
/// First outgoing call argument (`a10`); arguments occupy `a10..a14`.
pub const ARG1_REG: u8 = 10;
/// Second outgoing call argument (`a11`).
pub const ARG2_REG: u8 = 11;
/// First incoming argument, also the callee-side return register (`a2`).
pub const IN_REG: u8 = 2;

// RRR opcode bytes (the third instruction byte).
pub const OP_AND: u8 = 0x10;
pub const OP_OR: u8 = 0x20;
pub const OP_XOR: u8 = 0x30;
pub const OP_NEG: u8 = 0x60;
pub const OP_MULL: u8 = 0x82;
pub const OP_SUB: u8 = 0xc0;
pub const OP_QUOS: u8 = 0xd2;
pub const OP_REMS: u8 = 0xf2;

// Conditional branch condition codes (RRI8 `r` field).
pub const BR_EQ: u8 = 0x1;
pub const BR_LT: u8 = 0x2;
pub const BR_NE: u8 = 0x9;
pub const BR_GE: u8 = 0xa;

/// Growable machine-code buffer with one emission method per instruction.
#[derive(Debug, Default)]
pub struct CodeBuf {
    bytes: Vec<u8>,
}

impl CodeBuf {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Current size in bytes; doubles as the offset of the next instruction.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn emit2(&mut self, b0: u8, b1: u8) {
        self.bytes.push(b0);
        self.bytes.push(b1);
    }

    fn emit3(&mut self, b0: u8, b1: u8, b2: u8) {
        self.bytes.push(b0);
        self.bytes.push(b1);
        self.bytes.push(b2);
    }

    /// `L32I d, base, off` - load word; `off` is in bytes, must be a
    /// multiple of 4 within the encodable window.
    pub fn l32i(&mut self, d: u8, base: u8, off: i32) {
        self.emit3((d << 4) | 2, (2 << 4) | base, (off / 4) as u8);
    }

    /// `S32I s, base, off` - store word.
    pub fn s32i(&mut self, s: u8, base: u8, off: i32) {
        self.emit3((s << 4) | 2, (6 << 4) | base, (off / 4) as u8);
    }

    /// `L8UI d, base, off` - load byte, zero-extending.
    pub fn l8ui(&mut self, d: u8, base: u8, off: i32) {
        self.emit3((d << 4) | 2, base, off as u8);
    }

    /// `S8I s, base, off` - store byte.
    pub fn s8i(&mut self, s: u8, base: u8, off: i32) {
        self.emit3((s << 4) | 2, (4 << 4) | base, off as u8);
    }

    /// `L32R r` with a zero displacement; the 16-bit field at bytes 1..3 is
    /// filled in by the object writer.
    pub fn l32r(&mut self, r: u8) {
        self.emit3((r << 4) | 1, 0, 0);
    }

    /// Narrow `ADD.N d, s1, s2`.
    pub fn add_n(&mut self, d: u8, s1: u8, s2: u8) {
        self.emit2((s2 << 4) | 0xa, (d << 4) | s1);
    }

    /// Narrow `MOV.N d, s`.
    pub fn mov_n(&mut self, d: u8, s: u8) {
        self.emit2((d << 4) | 0xd, s);
    }

    /// Narrow `MOVI.N d, imm` for the tiny constants (0, 1, -1) the
    /// generator materializes inline.
    pub fn movi_n(&mut self, d: u8, imm: i32) {
        let i = ((imm & 0xf) << 12) | ((d as i32) << 8) | (((imm & 0x70) >> 4) << 4) | 0xc;
        self.emit2(i as u8, (i >> 8) as u8);
    }

    /// Wide `MOVI d, imm`; the caller guarantees `imm` fits the signed
    /// 12-bit immediate (otherwise the value goes through the literal pool).
    pub fn movi(&mut self, d: u8, imm: i32) {
        self.emit3((d << 4) | 2, 0xa0 | (((imm >> 8) & 0xf) as u8), imm as u8);
    }

    /// `ADDI d, s, imm`; the caller guarantees a signed 8-bit immediate.
    pub fn addi(&mut self, d: u8, s: u8, imm: i32) {
        self.emit3((d << 4) | 2, (0xc << 4) | s, imm as u8);
    }

    /// RRR-format ALU operation selected by its opcode byte.
    pub fn rrr(&mut self, op: u8, d: u8, s: u8, t: u8) {
        self.emit3(t << 4, (d << 4) | s, op);
    }

    /// `NEG d, t`.
    pub fn neg(&mut self, d: u8, t: u8) {
        self.rrr(OP_NEG, d, 0, t);
    }

    /// `XOR d, s, t`.
    pub fn xor(&mut self, d: u8, s: u8, t: u8) {
        self.rrr(OP_XOR, d, s, t);
    }

    /// `SSL s` - load the shift amount register for a left shift.
    pub fn ssl(&mut self, s: u8) {
        self.emit3(0x00, 0x10 | s, 0x40);
    }

    /// `SLL d, s` - shift left by the amount loaded with `ssl`.
    pub fn sll(&mut self, d: u8, s: u8) {
        self.emit3(0x00, (d << 4) | s, 0xa1);
    }

    /// `SSR s` - load the shift amount register for a right shift.
    pub fn ssr(&mut self, s: u8) {
        self.emit3(0x00, s, 0x40);
    }

    /// `SRL d, t` - shift right by the amount loaded with `ssr`.
    pub fn srl(&mut self, d: u8, t: u8) {
        self.emit3(t << 4, d << 4, 0xb1);
    }

    /// Conditional branch (`BEQ`/`BNE`/`BLT`/`BGE` via `cond`) that skips
    /// exactly one narrow instruction. The generator uses this for the
    /// compare-and-set-0/1 sequences.
    pub fn br(&mut self, cond: u8, s: u8, t: u8) {
        self.emit3((t << 4) | 7, (cond << 4) | s, 1);
    }

    /// Unconditional `J` with an 18-bit PC-relative offset (may be patched
    /// later via [`CodeBuf::patch_jump`]).
    pub fn j(&mut self, off: i32) {
        let i = 0x06u32 | ((off as u32 & 0x3ffff) << 6);
        self.emit3(i as u8, (i >> 8) as u8, (i >> 16) as u8);
    }

    /// `BEQZ s` with a 12-bit offset (may be patched later via
    /// [`CodeBuf::patch_beqz`]).
    pub fn beqz(&mut self, s: u8, off: i32) {
        let i = ((off as u32 & 0xfff) << 12) | ((s as u32) << 8) | 0x16;
        self.emit3(i as u8, (i >> 8) as u8, (i >> 16) as u8);
    }

    /// `CALLX8 a8` - windowed call through the address in `a8`.
    pub fn callx8(&mut self) {
        self.emit3(0xe0, 0x08, 0x00);
    }

    /// Narrow `RETW.N` - windowed return.
    pub fn retw_n(&mut self) {
        self.emit2(0x1d, 0xf0);
    }

    /// `ENTRY sp, frame` - rotate the register window and allocate `frame`
    /// bytes (encoded as `frame / 8` in the imm12 field).
    pub fn entry(&mut self, frame: i32) {
        let imm12 = frame / 8;
        self.emit3(0x36, (((imm12 & 0xf) << 4) | 1) as u8, (imm12 >> 4) as u8);
    }

    /// Resolves a forward `BEQZ` at `at` to branch to the current end of
    /// code.
    pub fn patch_beqz(&mut self, at: usize) {
        self.patch_branch(at, false);
    }

    /// Resolves a forward `J` at `at` to jump to the current end of code.
    pub fn patch_jump(&mut self, at: usize) {
        self.patch_branch(at, true);
    }

    fn patch_branch(&mut self, at: usize, is_jump: bool) {
        let off = self.bytes.len() as i32 - at as i32 - 4;
        let mut i = u32::from_le_bytes([self.bytes[at], self.bytes[at + 1], self.bytes[at + 2], 0]);
        if is_jump {
            i |= (off as u32 & 0x3ffff) << 6;
        } else {
            i |= (off as u32 & 0xfff) << 12;
        }
        self.bytes[at] = i as u8;
        self.bytes[at + 1] = (i >> 8) as u8;
        self.bytes[at + 2] = (i >> 16) as u8;
    }

    /// Rewrites the imm12 of the `ENTRY` at `at` with the real frame size,
    /// once the function body has been parsed and the local area is known.
    pub fn patch_entry(&mut self, at: usize, frame: i32) {
        let imm12 = frame / 8;
        self.bytes[at + 1] = (((imm12 & 0xf) << 4) | 1) as u8;
        self.bytes[at + 2] = (imm12 >> 4) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_and_stores() {
        let mut code = CodeBuf::new();
        code.l32i(RES_REG, SP_REG, 16);
        code.s32i(RES_REG, SP_REG, 16);
        code.l8ui(RES_REG, RES_REG, 0);
        code.s8i(ARG1_REG, RES_REG, 0);
        assert_eq!(
            code.bytes(),
            &[
                0x82, 0x21, 0x04, // l32i a8, a1, 16
                0x82, 0x61, 0x04, // s32i a8, a1, 16
                0x82, 0x08, 0x00, // l8ui a8, a8, 0
                0xa2, 0x48, 0x00, // s8i a10, a8, 0
            ]
        );
    }

    #[test]
    fn test_narrow_forms() {
        let mut code = CodeBuf::new();
        code.add_n(RES_REG, TMP_REG, RES_REG);
        code.mov_n(IN_REG, RES_REG);
        code.movi_n(RES_REG, 1);
        code.retw_n();
        assert_eq!(
            code.bytes(),
            &[
                0x8a, 0x89, // add.n a8, a9, a8
                0x2d, 0x08, // mov.n a2, a8
                0x0c, 0x18, // movi.n a8, 1
                0x1d, 0xf0, // retw.n
            ]
        );
    }

    #[test]
    fn test_movi_wide_immediates() {
        let mut code = CodeBuf::new();
        code.movi(RES_REG, 42);
        code.movi(RES_REG, -2048);
        code.movi(RES_REG, 2047);
        assert_eq!(
            code.bytes(),
            &[
                0x82, 0xa0, 0x2a, // movi a8, 42
                0x82, 0xa8, 0x00, // movi a8, -2048
                0x82, 0xa7, 0xff, // movi a8, 2047
            ]
        );
    }

    #[test]
    fn test_addi() {
        let mut code = CodeBuf::new();
        code.addi(RES_REG, SP_REG, 32);
        code.addi(RES_REG, RES_REG, -1);
        assert_eq!(
            code.bytes(),
            &[
                0x82, 0xc1, 0x20, // addi a8, a1, 32
                0x82, 0xc8, 0xff, // addi a8, a8, -1
            ]
        );
    }

    #[test]
    fn test_l32r_and_call() {
        let mut code = CodeBuf::new();
        code.l32r(RES_REG);
        code.callx8();
        assert_eq!(
            code.bytes(),
            &[
                0x81, 0x00, 0x00, // l32r a8 (displacement patched at link layout time)
                0xe0, 0x08, 0x00, // callx8
            ]
        );
    }

    #[test]
    fn test_entry_placeholder_and_patch() {
        let mut code = CodeBuf::new();
        code.entry(544);
        assert_eq!(code.bytes(), &[0x36, 0x41, 0x04]); // imm12 = 68
        code.patch_entry(0, 64);
        assert_eq!(code.bytes(), &[0x36, 0x81, 0x00]); // imm12 = 8
    }

    #[test]
    fn test_backward_jump() {
        let mut code = CodeBuf::new();
        code.j(-4);
        assert_eq!(code.bytes(), &[0x06, 0xff, 0xff]);
    }

    #[test]
    fn test_beqz_forward_patch() {
        let mut code = CodeBuf::new();
        let at = code.len();
        code.beqz(RES_REG, 0);
        assert_eq!(code.bytes(), &[0x16, 0x08, 0x00]);
        code.movi(RES_REG, 1);
        code.movi(RES_REG, 2);
        // Displacement is end-of-code minus branch minus 4.
        code.patch_beqz(at);
        assert_eq!(&code.bytes()[..3], &[0x16, 0x58, 0x00]);
    }

    #[test]
    fn test_jump_forward_patch() {
        let mut code = CodeBuf::new();
        let at = code.len();
        code.j(0);
        code.retw_n();
        code.patch_jump(at);
        // off = 5 - 0 - 4 = 1
        assert_eq!(&code.bytes()[..3], &[0x46, 0x00, 0x00]);
    }

    #[test]
    fn test_branch_skips_one_narrow_instruction() {
        let mut code = CodeBuf::new();
        code.br(BR_NE, TMP_REG, ARG1_REG);
        assert_eq!(code.bytes(), &[0xa7, 0x99, 0x01]);
    }

    #[test]
    fn test_shift_sequences() {
        let mut code = CodeBuf::new();
        code.ssl(RES_REG);
        code.sll(RES_REG, TMP_REG);
        code.ssr(RES_REG);
        code.srl(RES_REG, TMP_REG);
        assert_eq!(
            code.bytes(),
            &[
                0x00, 0x18, 0x40, // ssl a8
                0x00, 0x89, 0xa1, // sll a8, a9
                0x00, 0x08, 0x40, // ssr a8
                0x90, 0x80, 0xb1, // srl a8, a9
            ]
        );
    }
}
