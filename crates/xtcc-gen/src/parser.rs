//! Single-pass recursive-descent parser and code generator.
//!
//! Parsing and emission are interleaved: there is no AST, and every
//! production writes its instructions into the code buffer the moment it is
//! recognized. This fixes the code-generation order, and with it the
//! literal-pool layout, so the object file is a deterministic function of
//! the source text.
//!
//! Calling convention (Xtensa windowed ABI, `call8`):
//!
//! * expression results accumulate in `a8`, scratch in `a9`;
//! * outgoing call arguments go in `a10..a14`, the return value comes back
//!   in `a10`;
//! * inside a callee the arguments arrive in `a2..a6` and are spilled to
//!   their stack slots by the prologue; `a2` carries the return value out;
//! * each frame starts with the 32-byte register-window save area, then
//!   locals, then the expression spill stack tracked by `esp`.
//!
//! `&&` and `||` evaluate both operands and combine the normalized 0/1
//! values bitwise - there is no short-circuiting.

use xtcc_lex::{Lexer, Token};

use crate::asm::{
    CodeBuf, ARG1_REG, ARG2_REG, BR_EQ, BR_GE, BR_LT, BR_NE, IN_REG, OP_AND, OP_MULL, OP_OR,
    OP_QUOS, OP_REMS, OP_SUB, RES_REG, SP_REG, TMP_REG,
};
use crate::error::{CodeGenError, Result};
use crate::lits::{LitKind, LitPool, Patch};
use crate::syms::{Func, FuncTable, VarTable};
use crate::ty::Ty;

/// Register-window save area at the top of every frame, required by the
/// windowed ABI.
const SAVE_AREA: i32 = 32;

/// Upper bound on a function's local area (locals plus expression spill
/// slots), in bytes.
const MAX_LOCAL_AREA: i32 = 512;

/// Placeholder frame size for the `ENTRY` emitted before the body is
/// parsed; rewritten with the real size afterwards.
const MAX_FRAME: i32 = (MAX_LOCAL_AREA + SAVE_AREA + 15) & !15;

/// The windowed ABI maps outgoing arguments onto `a10..a14`.
const MAX_CALL_ARGS: usize = 5;

/// Everything the object writer needs from a compilation.
#[derive(Debug)]
pub struct CompiledUnit {
    /// Machine code, offsets relative to the end of the literal pool.
    pub code: Vec<u8>,
    /// String literal bytes (NUL-terminated, in order of appearance).
    pub rodata: Vec<u8>,
    /// Total size of zero-initialized globals.
    pub bss_size: u32,
    /// Literal pool slots in layout order.
    pub lits: Vec<(i32, LitKind)>,
    /// `L32R` sites awaiting displacement resolution.
    pub patches: Vec<Patch>,
    /// Function table in symbol order.
    pub funcs: Vec<Func>,
    /// Number of global symbols (variables, arrays and enum constants).
    pub globals: usize,
    /// Source line count.
    pub lines: u32,
    /// Token count.
    pub tokens: u32,
}

/// Compiles a whole source buffer.
pub fn compile(source: &str) -> Result<CompiledUnit> {
    Compiler::new(source)?.compile()
}

/// The compiler context: token cursor plus all emission state.
pub struct Compiler<'a> {
    lexer: Lexer<'a>,
    token: Token,
    code: CodeBuf,
    pool: LitPool,
    vars: VarTable,
    funcs: FuncTable,
    rodata: Vec<u8>,
    bss_size: u32,
    /// Next free stack offset in the current frame (starts past the save
    /// area).
    locals: i32,
    /// Expression spill cursor above `locals`; zero at statement
    /// boundaries.
    esp: i32,
    /// Type of the most recently evaluated expression.
    expr_type: Ty,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler over `source` and primes the first token.
    pub fn new(source: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let token = lexer.next_token()?;
        Ok(Self {
            lexer,
            token,
            code: CodeBuf::new(),
            pool: LitPool::new(),
            vars: VarTable::new(),
            funcs: FuncTable::new(),
            rodata: Vec::new(),
            bss_size: 0,
            locals: SAVE_AREA,
            esp: 0,
            expr_type: Ty::INT,
        })
    }

    /// Parses every top-level item and returns the compiled unit.
    pub fn compile(mut self) -> Result<CompiledUnit> {
        while self.token != Token::Eof {
            self.parse_item()?;
        }
        let (lits, patches) = self.pool.into_parts();
        Ok(CompiledUnit {
            code: self.code.into_bytes(),
            rodata: self.rodata,
            bss_size: self.bss_size,
            lits,
            patches,
            funcs: self.funcs.into_vec(),
            globals: self.vars.globals(),
            lines: self.lexer.line(),
            tokens: self.lexer.token_count(),
        })
    }

    // ---- token plumbing ----

    fn advance(&mut self) -> Result<()> {
        self.token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if &self.token != expected {
            return Err(CodeGenError::UnexpectedToken {
                line: self.lexer.line(),
                expected: expected.to_string(),
                found: self.token.to_string(),
            });
        }
        self.advance()
    }

    /// Consumes the current token, which must be an identifier, and returns
    /// its name.
    fn expect_ident(&mut self) -> Result<String> {
        match std::mem::replace(&mut self.token, Token::Eof) {
            Token::Ident(name) => {
                self.advance()?;
                Ok(name)
            }
            other => Err(CodeGenError::UnexpectedToken {
                line: self.lexer.line(),
                expected: "identifier".to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Consumes a numeric literal and returns its value.
    fn take_num(&mut self) -> Result<i32> {
        match self.token {
            Token::Num(value) => {
                self.advance()?;
                Ok(value)
            }
            ref other => Err(CodeGenError::UnexpectedToken {
                line: self.lexer.line(),
                expected: "number".to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Consumes a string literal and returns its bytes.
    fn take_str(&mut self) -> Result<Vec<u8>> {
        match std::mem::replace(&mut self.token, Token::Eof) {
            Token::Str(bytes) => {
                self.advance()?;
                Ok(bytes)
            }
            other => Err(CodeGenError::UnexpectedToken {
                line: self.lexer.line(),
                expected: "string literal".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn find_var(&self, name: &str) -> Result<usize> {
        self.vars
            .find(name)
            .ok_or_else(|| CodeGenError::UndefinedIdent {
                line: self.lexer.line(),
                name: name.to_string(),
            })
    }

    // ---- emission helpers ----

    /// Routes a 32-bit value through the literal pool and loads it into
    /// `a8` with `L32R`, recording the patch site.
    fn emit_load_lit(&mut self, value: i32, kind: LitKind) {
        let lit = self.pool.intern(value, kind);
        self.pool.record_use(self.code.len(), lit);
        self.code.l32r(RES_REG);
    }

    /// Loads `imm` into `d`: the wide `MOVI` covers `[-2048, 2048)`, wider
    /// values go through the literal pool (landing in `a8` first).
    fn emit_movi(&mut self, d: u8, imm: i32) {
        if (-2048..2048).contains(&imm) {
            self.code.movi(d, imm);
        } else {
            self.emit_load_lit(imm, LitKind::Int);
            if d != RES_REG {
                self.code.mov_n(d, RES_REG);
            }
        }
    }

    /// `d = s + imm` with the `[-128, 128)` `ADDI` window; out-of-range
    /// immediates are synthesized through the scratch register.
    fn emit_addi(&mut self, d: u8, s: u8, imm: i32) {
        if (-128..128).contains(&imm) {
            self.code.addi(d, s, imm);
        } else {
            self.emit_movi(TMP_REG, imm);
            self.code.add_n(d, s, TMP_REG);
        }
    }

    /// Spills `r` to the expression stack.
    fn push(&mut self, r: u8) {
        self.code.s32i(r, SP_REG, self.locals + self.esp);
        self.esp += 4;
    }

    /// Reloads the most recent spill into `r`.
    fn pop(&mut self, r: u8) {
        self.esp -= 4;
        self.code.l32i(r, SP_REG, self.locals + self.esp);
    }

    /// Loads the address of a variable into `a8`.
    fn load_var_address(&mut self, offset: i32, ty: Ty) {
        if ty.is_global() {
            self.emit_load_lit(offset, LitKind::Bss);
        } else {
            self.emit_addi(RES_REG, SP_REG, offset);
        }
    }

    /// Loads a variable's value (or address, for arrays; or literal value,
    /// for enum constants) into `a8` and sets `expr_type`.
    fn load_var(&mut self, offset: i32, ty: Ty) {
        let is_byte = ty.is_scalar_byte();
        if ty.is_const() {
            self.emit_movi(RES_REG, offset);
            self.expr_type = Ty::INT;
        } else if ty.is_arr() {
            self.load_var_address(offset, ty);
            self.expr_type = if ty.is_byte() { Ty::BYTE_PTR } else { Ty::INT_PTR };
        } else if ty.is_global() {
            self.load_var_address(offset, ty);
            if is_byte {
                self.code.l8ui(RES_REG, RES_REG, 0);
            } else {
                self.code.l32i(RES_REG, RES_REG, 0);
            }
            self.expr_type = ty.base();
        } else {
            if is_byte {
                self.code.l8ui(RES_REG, SP_REG, offset);
            } else {
                self.code.l32i(RES_REG, SP_REG, offset);
            }
            self.expr_type = ty.base();
        }
    }

    // ---- expressions ----

    /// Compiles the operator whose operands sit in `a9` (left) and `a8`
    /// (right), leaving the result in `a8`.
    fn emit_binop(&mut self, op: &Token) {
        match op {
            // Both sides are normalized to 0/1, then combined bitwise.
            Token::AndAnd | Token::OrOr => {
                self.code.movi_n(ARG1_REG, 0);
                self.code.beqz(TMP_REG, 1);
                self.code.movi_n(ARG1_REG, 1);
                self.code.movi_n(ARG2_REG, 0);
                self.code.beqz(RES_REG, 1);
                self.code.movi_n(ARG2_REG, 1);
                let opcode = if *op == Token::AndAnd { OP_AND } else { OP_OR };
                self.code.rrr(opcode, RES_REG, ARG2_REG, ARG1_REG);
            }
            // a8 = 0, then branch over `movi.n a8, 1` when the comparison
            // is false.
            Token::EqEq | Token::Ne | Token::Lt | Token::Gt | Token::Le | Token::Ge => {
                self.code.mov_n(ARG1_REG, RES_REG);
                self.code.movi_n(RES_REG, 0);
                match op {
                    Token::Lt => self.code.br(BR_GE, TMP_REG, ARG1_REG),
                    Token::Le => self.code.br(BR_LT, ARG1_REG, TMP_REG),
                    Token::Gt => self.code.br(BR_GE, ARG1_REG, TMP_REG),
                    Token::Ge => self.code.br(BR_LT, TMP_REG, ARG1_REG),
                    Token::EqEq => self.code.br(BR_NE, TMP_REG, ARG1_REG),
                    _ => self.code.br(BR_EQ, TMP_REG, ARG1_REG),
                }
                self.code.movi_n(RES_REG, 1);
            }
            Token::Plus => self.code.add_n(RES_REG, TMP_REG, RES_REG),
            Token::Minus => self.code.rrr(OP_SUB, RES_REG, TMP_REG, RES_REG),
            Token::Star => self.code.rrr(OP_MULL, RES_REG, TMP_REG, RES_REG),
            Token::Slash => self.code.rrr(OP_QUOS, RES_REG, TMP_REG, RES_REG),
            Token::Percent => self.code.rrr(OP_REMS, RES_REG, TMP_REG, RES_REG),
            Token::Amp => self.code.rrr(OP_AND, RES_REG, TMP_REG, RES_REG),
            Token::Pipe => self.code.rrr(OP_OR, RES_REG, TMP_REG, RES_REG),
            Token::Caret => self.code.xor(RES_REG, TMP_REG, RES_REG),
            Token::Shl => {
                self.code.ssl(RES_REG);
                self.code.sll(RES_REG, TMP_REG);
            }
            Token::Shr => {
                self.code.ssr(RES_REG);
                self.code.srl(RES_REG, TMP_REG);
            }
            _ => {}
        }
        self.expr_type = Ty::INT;
    }

    /// Compiles a call; on return the callee's result is in `a10`.
    fn parse_call(&mut self, name: &str) -> Result<()> {
        self.advance()?; // past '('
        if self.token != Token::RParen {
            let mut arg_count = 0usize;
            loop {
                self.parse_expr(1)?;
                self.push(RES_REG);
                arg_count += 1;
                if arg_count > MAX_CALL_ARGS {
                    return Err(CodeGenError::TooManyArgs {
                        line: self.lexer.line(),
                    });
                }
                if self.token != Token::Comma {
                    break;
                }
                self.advance()?;
            }
            // Pop in reverse into a10..a14.
            while arg_count > 0 {
                arg_count -= 1;
                self.pop(ARG1_REG + arg_count as u8);
            }
        }
        self.expect(&Token::RParen)?;
        let func = self.funcs.intern(name);
        self.emit_load_lit(func as i32, LitKind::Func);
        self.code.callx8();
        Ok(())
    }

    /// Compiles `[index]` after the base address has been loaded into `a8`:
    /// scales by 4 for word element types and adds the base back in.
    fn parse_index(&mut self, base_ty: Ty) -> Result<()> {
        self.advance()?; // past '['
        self.push(RES_REG);
        self.parse_expr(1)?;
        self.expect(&Token::RBracket)?;
        if !base_ty.is_byte() {
            self.code.add_n(RES_REG, RES_REG, RES_REG);
            self.code.add_n(RES_REG, RES_REG, RES_REG);
        }
        self.pop(TMP_REG);
        self.code.add_n(RES_REG, TMP_REG, RES_REG);
        Ok(())
    }

    /// Prefix operators and primary expressions.
    fn parse_factor(&mut self) -> Result<()> {
        if self.token == Token::Inc || self.token == Token::Dec {
            let diff = if self.token == Token::Inc { 1 } else { -1 };
            self.advance()?;
            let name = self.expect_ident()?;
            let i = self.find_var(&name)?;
            let (offset, ty) = {
                let v = self.vars.var(i);
                (v.offset, v.ty)
            };
            self.load_var(offset, ty);
            self.emit_addi(RES_REG, RES_REG, diff);
            let is_byte = ty.is_scalar_byte();
            if ty.is_global() {
                self.code.mov_n(ARG1_REG, RES_REG);
                self.load_var_address(offset, ty);
                if is_byte {
                    self.code.s8i(ARG1_REG, RES_REG, 0);
                } else {
                    self.code.s32i(ARG1_REG, RES_REG, 0);
                }
                self.code.mov_n(RES_REG, ARG1_REG);
            } else if is_byte {
                self.code.s8i(RES_REG, SP_REG, offset);
            } else {
                self.code.s32i(RES_REG, SP_REG, offset);
            }
            self.expr_type = Ty::INT;
        } else if self.token == Token::Bang
            || self.token == Token::Tilde
            || self.token == Token::Minus
        {
            let op = self.token.clone();
            self.advance()?;
            self.parse_factor()?;
            match op {
                Token::Minus => self.code.neg(RES_REG, RES_REG),
                Token::Tilde => {
                    self.emit_movi(TMP_REG, -1);
                    self.code.xor(RES_REG, RES_REG, TMP_REG);
                }
                _ => {
                    // Logical not: normalize to 0/1 with an inverted test.
                    self.code.movi_n(TMP_REG, 1);
                    self.code.beqz(RES_REG, 1);
                    self.code.movi_n(TMP_REG, 0);
                    self.code.mov_n(RES_REG, TMP_REG);
                }
            }
            self.expr_type = Ty::INT;
        } else if self.token == Token::Star {
            self.advance()?;
            self.parse_factor()?;
            if self.expr_type.is_byte() {
                self.code.l8ui(RES_REG, RES_REG, 0);
                self.expr_type = Ty::BYTE;
            } else {
                self.code.l32i(RES_REG, RES_REG, 0);
                self.expr_type = Ty::INT;
            }
        } else if self.token == Token::Amp {
            self.advance()?;
            let name = self.expect_ident()?;
            let i = self.find_var(&name)?;
            let (offset, ty) = {
                let v = self.vars.var(i);
                (v.offset, v.ty)
            };
            self.load_var_address(offset, ty);
            self.expr_type = if ty.is_byte() { Ty::BYTE_PTR } else { Ty::INT_PTR };
        } else if let Token::Num(value) = self.token {
            self.emit_movi(RES_REG, value);
            self.expr_type = Ty::INT;
            self.advance()?;
        } else if matches!(self.token, Token::Str(_)) {
            let bytes = self.take_str()?;
            self.emit_load_lit(self.rodata.len() as i32, LitKind::Str);
            self.rodata.extend_from_slice(&bytes);
            self.rodata.push(0);
            self.expr_type = Ty::BYTE_PTR;
        } else if matches!(self.token, Token::Ident(_)) {
            let name = self.expect_ident()?;
            if self.token == Token::LParen {
                self.parse_call(&name)?;
                self.code.mov_n(RES_REG, ARG1_REG);
                self.expr_type = Ty::INT;
            } else {
                let i = self.find_var(&name)?;
                let (offset, ty) = {
                    let v = self.vars.var(i);
                    (v.offset, v.ty)
                };
                self.load_var(offset, ty);
                if self.token == Token::LBracket {
                    let base_ty = self.expr_type;
                    self.parse_index(base_ty)?;
                    if base_ty.is_byte() {
                        self.code.l8ui(RES_REG, RES_REG, 0);
                        self.expr_type = Ty::BYTE;
                    } else {
                        self.code.l32i(RES_REG, RES_REG, 0);
                        self.expr_type = Ty::INT;
                    }
                }
            }
        } else if self.token == Token::LParen {
            self.advance()?;
            self.parse_expr(1)?;
            self.expect(&Token::RParen)?;
        } else {
            return Err(CodeGenError::ExpectedExpression {
                line: self.lexer.line(),
                found: self.token.to_string(),
            });
        }
        Ok(())
    }

    /// Precedence-climbing expression parser. Binary operators are
    /// left-associative; `?:` recurses at level 2 on the true arm and level
    /// 1 on the false arm.
    fn parse_expr(&mut self, limit: u8) -> Result<()> {
        self.parse_factor()?;
        while precedence(&self.token) >= limit {
            let op = self.token.clone();
            self.advance()?;
            if op == Token::Question {
                let to_false = self.code.len();
                self.code.beqz(RES_REG, 0);
                self.parse_expr(2)?;
                let to_end = self.code.len();
                self.code.j(0);
                self.expect(&Token::Colon)?;
                self.code.patch_beqz(to_false);
                self.parse_expr(1)?;
                self.code.patch_jump(to_end);
            } else {
                self.push(RES_REG);
                self.parse_expr(precedence(&op) + 1)?;
                self.pop(TMP_REG);
                self.emit_binop(&op);
            }
        }
        Ok(())
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> Result<()> {
        self.esp = 0;
        if self.token == Token::While {
            self.advance()?;
            let loop_start = self.code.len();
            self.expect(&Token::LParen)?;
            self.parse_expr(1)?;
            self.expect(&Token::RParen)?;
            let exit_patch = self.code.len();
            self.code.beqz(RES_REG, 0);
            self.parse_stmt()?;
            self.code.j(loop_start as i32 - self.code.len() as i32 - 4);
            self.code.patch_beqz(exit_patch);
        } else if self.token == Token::If {
            self.advance()?;
            self.expect(&Token::LParen)?;
            self.parse_expr(1)?;
            self.expect(&Token::RParen)?;
            let over_then = self.code.len();
            self.code.beqz(RES_REG, 0);
            self.parse_stmt()?;
            if self.token == Token::Else {
                let over_else = self.code.len();
                self.code.j(0);
                self.code.patch_beqz(over_then);
                self.advance()?;
                self.parse_stmt()?;
                self.code.patch_jump(over_else);
            } else {
                self.code.patch_beqz(over_then);
            }
        } else if self.token == Token::LBrace {
            self.advance()?;
            while self.token != Token::RBrace && self.token != Token::Eof {
                self.parse_stmt()?;
            }
            self.expect(&Token::RBrace)?;
        } else if self.token == Token::Int || self.token == Token::Char {
            self.parse_local_decl()?;
        } else if self.token == Token::Return {
            self.advance()?;
            if self.token != Token::Semi {
                self.parse_expr(1)?;
            } else {
                self.code.movi_n(RES_REG, 0);
            }
            self.code.mov_n(IN_REG, RES_REG);
            self.code.retw_n();
            self.expect(&Token::Semi)?;
        } else if matches!(self.token, Token::Ident(_)) {
            self.parse_assign_or_call()?;
        } else if self.token == Token::Star {
            // Store through a pointer: *p = e;
            self.advance()?;
            self.parse_factor()?;
            let pointee = self.expr_type;
            self.push(RES_REG);
            self.expect(&Token::Assign)?;
            self.parse_expr(1)?;
            self.pop(ARG1_REG);
            if pointee.is_byte() {
                self.code.s8i(RES_REG, ARG1_REG, 0);
            } else {
                self.code.s32i(RES_REG, ARG1_REG, 0);
            }
            self.expect(&Token::Semi)?;
        } else {
            self.parse_expr(1)?;
            self.expect(&Token::Semi)?;
        }
        Ok(())
    }

    /// Local declaration: scalar with optional initializer, or array.
    fn parse_local_decl(&mut self) -> Result<()> {
        let is_byte = self.token == Token::Char;
        self.advance()?;
        let mut is_ptr = false;
        while self.token == Token::Star {
            is_ptr = true;
            self.advance()?;
        }
        let name = self.expect_ident()?;
        let offset = self.locals;

        if self.token == Token::LBracket {
            self.advance()?;
            let size = self.take_num()?;
            self.expect(&Token::RBracket)?;
            self.vars.add_local(name, offset, Ty::array(is_byte));
            self.locals += if is_byte { align4(size) } else { size * 4 };
        } else {
            self.vars.add_local(name, offset, Ty::scalar(is_byte, is_ptr));
            self.locals += 4;
            if self.token == Token::Assign {
                self.advance()?;
                self.parse_expr(1)?;
                if is_byte && !is_ptr {
                    self.code.s8i(RES_REG, SP_REG, offset);
                } else {
                    self.code.s32i(RES_REG, SP_REG, offset);
                }
            }
        }

        if self.locals >= MAX_LOCAL_AREA {
            return Err(CodeGenError::FrameTooLarge {
                line: self.lexer.line(),
            });
        }
        self.expect(&Token::Semi)
    }

    /// Statement starting with an identifier: call, indexed store, or
    /// scalar assignment.
    fn parse_assign_or_call(&mut self) -> Result<()> {
        let name = self.expect_ident()?;
        if self.token == Token::LParen {
            self.parse_call(&name)?;
            return self.expect(&Token::Semi);
        }

        let i = self.find_var(&name)?;
        let (offset, ty) = {
            let v = self.vars.var(i);
            (v.offset, v.ty)
        };
        if self.token == Token::LBracket {
            self.load_var(offset, ty);
            let base_ty = self.expr_type;
            self.parse_index(base_ty)?;
            self.push(RES_REG);
            self.expect(&Token::Assign)?;
            self.parse_expr(1)?;
            self.pop(ARG1_REG);
            if base_ty.is_byte() {
                self.code.s8i(RES_REG, ARG1_REG, 0);
            } else {
                self.code.s32i(RES_REG, ARG1_REG, 0);
            }
        } else {
            self.expect(&Token::Assign)?;
            self.parse_expr(1)?;
            if ty.is_global() {
                self.code.mov_n(ARG1_REG, RES_REG);
                self.emit_load_lit(offset, LitKind::Bss);
                self.code.s32i(ARG1_REG, RES_REG, 0);
                self.code.mov_n(RES_REG, ARG1_REG);
            } else {
                self.code.s32i(RES_REG, SP_REG, offset);
            }
        }
        self.expect(&Token::Semi)
    }

    // ---- top-level items ----

    /// Top-level dispatch: enum declaration, global variable/array, or
    /// function prototype/definition.
    fn parse_item(&mut self) -> Result<()> {
        if self.token == Token::Enum {
            return self.parse_enum();
        }

        let is_byte = self.token == Token::Char;
        if matches!(self.token, Token::Int | Token::Char | Token::Void) {
            self.advance()?;
        }
        let mut is_ptr = false;
        while self.token == Token::Star {
            is_ptr = true;
            self.advance()?;
        }
        let name = self.expect_ident()?;

        if self.token == Token::Semi || self.token == Token::LBracket {
            self.parse_global(name, is_byte, is_ptr)
        } else {
            self.parse_function(&name)
        }
    }

    /// `enum { A, B = 5, C };` - each enumerator becomes a global constant.
    fn parse_enum(&mut self) -> Result<()> {
        self.advance()?;
        if matches!(self.token, Token::Ident(_)) {
            self.advance()?; // optional tag, ignored
        }
        self.expect(&Token::LBrace)?;
        let mut value: i32 = 0;
        while matches!(self.token, Token::Ident(_)) {
            let name = self.expect_ident()?;
            if self.token == Token::Assign {
                self.advance()?;
                value = self.take_num()?;
            }
            self.vars.add_global(name, value, Ty::CONST_INT);
            value += 1;
            if self.token == Token::Comma {
                self.advance()?;
            }
        }
        self.expect(&Token::RBrace)?;
        self.expect(&Token::Semi)
    }

    /// Global variable or array; storage is allocated in `.bss` at the next
    /// offset. Byte array sizes round up to 4.
    fn parse_global(&mut self, name: String, is_byte: bool, is_ptr: bool) -> Result<()> {
        let offset = self.bss_size as i32;
        if self.token == Token::LBracket {
            self.advance()?;
            let size = if let Token::Num(value) = self.token {
                self.advance()?;
                value
            } else if matches!(self.token, Token::Ident(_)) {
                let const_name = self.expect_ident()?;
                let i = self.vars.find(&const_name);
                match i {
                    Some(i) if self.vars.var(i).ty.is_const() => self.vars.var(i).offset,
                    _ => {
                        return Err(CodeGenError::UndefinedConst {
                            line: self.lexer.line(),
                            name: const_name,
                        })
                    }
                }
            } else {
                return Err(CodeGenError::ArraySizeExpected {
                    line: self.lexer.line(),
                });
            };
            self.expect(&Token::RBracket)?;
            self.vars.add_global(name, offset, Ty::array(is_byte).global());
            let bytes = if is_byte { align4(size) } else { size * 4 };
            self.bss_size += bytes as u32;
        } else {
            self.vars
                .add_global(name, offset, Ty::scalar(is_byte, is_ptr).global());
            self.bss_size += 4;
        }
        self.expect(&Token::Semi)
    }

    /// Function prototype or definition. A definition emits a placeholder
    /// `ENTRY`, spills incoming arguments, compiles the body, then rewrites
    /// the `ENTRY` with the rounded-up real frame size.
    fn parse_function(&mut self, name: &str) -> Result<()> {
        self.expect(&Token::LParen)?;
        self.vars.enter_function();
        self.locals = SAVE_AREA;
        let mut n_args = 0usize;

        while self.token != Token::RParen {
            let mut is_byte = false;
            let mut ptr_count = 0usize;
            if self.token == Token::Char {
                is_byte = true;
                self.advance()?;
            } else if matches!(
                self.token,
                Token::Int | Token::Void | Token::Ident(_) | Token::Ellipsis
            ) {
                self.advance()?;
            }
            while self.token == Token::Star {
                ptr_count += 1;
                self.advance()?;
            }
            if matches!(self.token, Token::Ident(_)) {
                let param = self.expect_ident()?;
                let ty = if ptr_count >= 2 {
                    Ty::INT_PTR
                } else if ptr_count == 1 {
                    Ty::scalar(is_byte, true)
                } else {
                    Ty::scalar(is_byte, false)
                };
                self.vars.add_local(param, self.locals, ty);
                self.locals += 4;
                n_args += 1;
            }
            if self.token == Token::Comma {
                self.advance()?;
            }
        }
        self.expect(&Token::RParen)?;

        if self.token == Token::Semi {
            self.advance()?;
            return Ok(()); // prototype
        }

        let func = self.funcs.intern(name);
        let entry_addr = self.code.len();
        self.funcs.define(func, entry_addr as u32);
        self.expect(&Token::LBrace)?;

        self.code.entry(MAX_FRAME);
        for j in 0..n_args {
            let offset = self.vars.local(j).offset;
            self.code.s32i(IN_REG + j as u8, SP_REG, offset);
        }

        while self.token != Token::RBrace && self.token != Token::Eof {
            self.parse_stmt()?;
        }

        let frame = (self.locals + SAVE_AREA + 15) & !15;
        self.code.patch_entry(entry_addr, frame);
        self.code.retw_n();
        self.expect(&Token::RBrace)
    }
}

/// Operator precedence, 1 (lowest, `?:`) to 11 (`* / %`); 0 means "not a
/// binary operator".
fn precedence(token: &Token) -> u8 {
    match token {
        Token::Question => 1,
        Token::OrOr => 2,
        Token::AndAnd => 3,
        Token::Pipe => 4,
        Token::Caret => 5,
        Token::Amp => 6,
        Token::EqEq | Token::Ne => 7,
        Token::Lt | Token::Gt | Token::Le | Token::Ge => 8,
        Token::Shl | Token::Shr => 9,
        Token::Plus | Token::Minus => 10,
        Token::Star | Token::Slash | Token::Percent => 11,
        _ => 0,
    }
}

fn align4(x: i32) -> i32 {
    (x + 3) & !3
}
