//! Main lexer implementation for the xtcc C subset.
//!
//! The lexer produces one token per call, in the order the parser consumes
//! them; there is no token buffer. Integer literals follow `strtol` base-0
//! rules (`0x` hex, leading `0` octal, decimal otherwise), and character
//! literals produce plain [`Token::Num`] values.

use crate::cursor::Cursor;
use crate::error::{LexError, Result};
use crate::token::{keyword_from_ident, Token};

/// The lexer for xtcc source code.
///
/// # Example
///
/// ```
/// use xtcc_lex::{Lexer, Token};
///
/// let mut lexer = Lexer::new("int x;");
/// assert_eq!(lexer.next_token().unwrap(), Token::Int);
/// assert_eq!(lexer.next_token().unwrap(), Token::Ident("x".into()));
/// assert_eq!(lexer.next_token().unwrap(), Token::Semi);
/// assert_eq!(lexer.next_token().unwrap(), Token::Eof);
/// ```
pub struct Lexer<'a> {
    /// Byte cursor over the source.
    cursor: Cursor<'a>,

    /// Number of tokens produced so far (excluding `Eof`).
    tokens: u32,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer over `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
            tokens: 0,
        }
    }

    /// Returns the current source line (1-based).
    pub fn line(&self) -> u32 {
        self.cursor.line()
    }

    /// Returns the number of tokens produced so far.
    pub fn token_count(&self) -> u32 {
        self.tokens
    }

    /// Returns the next token from the source.
    ///
    /// Skips whitespace and `//` comments first, then dispatches on the
    /// first byte of the token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();

        if self.cursor.is_at_end() {
            return Ok(Token::Eof);
        }

        let token = match self.cursor.current() {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_ident_or_keyword(),
            b'0'..=b'9' => self.lex_number(),
            b'\'' => self.lex_char_literal(),
            b'"' => self.lex_string()?,
            _ => self.lex_operator()?,
        };

        self.tokens += 1;
        Ok(token)
    }

    /// Skips whitespace and `//` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.cursor.current() {
                b' ' | b'\t' | b'\n' | b'\r' => self.cursor.advance(),
                b'/' if self.cursor.peek(1) == b'/' => {
                    while !self.cursor.is_at_end() && self.cursor.current() != b'\n' {
                        self.cursor.advance();
                    }
                }
                _ => return,
            }
        }
    }

    /// Lexes an identifier or keyword.
    fn lex_ident_or_keyword(&mut self) -> Token {
        let start = self.cursor.position();
        while matches!(self.cursor.current(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.cursor.advance();
        }

        let text = self.cursor.slice_from(start);
        keyword_from_ident(text)
            .unwrap_or_else(|| Token::Ident(String::from_utf8_lossy(text).into_owned()))
    }

    /// Lexes an integer literal with `strtol` base-0 prefix rules.
    fn lex_number(&mut self) -> Token {
        let mut value: i32 = 0;

        if self.cursor.current() == b'0'
            && (self.cursor.peek(1) | 0x20) == b'x'
            && self.cursor.peek(2).is_ascii_hexdigit()
        {
            self.cursor.advance_n(2);
            while self.cursor.current().is_ascii_hexdigit() {
                let digit = hex_digit_value(self.cursor.current());
                value = value.wrapping_mul(16).wrapping_add(digit as i32);
                self.cursor.advance();
            }
        } else if self.cursor.current() == b'0' {
            // Octal; a lone `0` is handled here too.
            while matches!(self.cursor.current(), b'0'..=b'7') {
                value = value
                    .wrapping_mul(8)
                    .wrapping_add((self.cursor.current() - b'0') as i32);
                self.cursor.advance();
            }
        } else {
            while self.cursor.current().is_ascii_digit() {
                value = value
                    .wrapping_mul(10)
                    .wrapping_add((self.cursor.current() - b'0') as i32);
                self.cursor.advance();
            }
        }

        Token::Num(value)
    }

    /// Lexes a character literal into a `Num` token.
    ///
    /// A missing closing quote is tolerated; exactly one (possibly escaped)
    /// character is consumed either way.
    fn lex_char_literal(&mut self) -> Token {
        self.cursor.advance(); // opening quote

        let value = if self.cursor.current() == b'\\' {
            self.cursor.advance();
            escape_value(self.cursor.current())
        } else {
            self.cursor.current()
        };
        self.cursor.advance();

        if self.cursor.current() == b'\'' {
            self.cursor.advance();
        }

        Token::Num(value as i32)
    }

    /// Lexes a string literal into its raw bytes (escapes resolved, no
    /// trailing NUL).
    fn lex_string(&mut self) -> Result<Token> {
        let line = self.cursor.line();
        self.cursor.advance(); // opening quote

        let mut bytes = Vec::new();
        loop {
            if self.cursor.is_at_end() {
                return Err(LexError::UnterminatedString { line });
            }
            match self.cursor.current() {
                b'"' => {
                    self.cursor.advance();
                    return Ok(Token::Str(bytes));
                }
                b'\\' => {
                    self.cursor.advance();
                    bytes.push(escape_value(self.cursor.current()));
                    self.cursor.advance();
                }
                b => {
                    bytes.push(b);
                    self.cursor.advance();
                }
            }
        }
    }

    /// Lexes punctuation, longest match first.
    fn lex_operator(&mut self) -> Result<Token> {
        let (a, b) = (self.cursor.current(), self.cursor.peek(1));

        let two = match (a, b) {
            (b'+', b'+') => Some(Token::Inc),
            (b'-', b'-') => Some(Token::Dec),
            (b'=', b'=') => Some(Token::EqEq),
            (b'!', b'=') => Some(Token::Ne),
            (b'<', b'=') => Some(Token::Le),
            (b'>', b'=') => Some(Token::Ge),
            (b'<', b'<') => Some(Token::Shl),
            (b'>', b'>') => Some(Token::Shr),
            (b'&', b'&') => Some(Token::AndAnd),
            (b'|', b'|') => Some(Token::OrOr),
            _ => None,
        };
        if let Some(token) = two {
            self.cursor.advance_n(2);
            return Ok(token);
        }

        if a == b'.' && b == b'.' && self.cursor.peek(2) == b'.' {
            self.cursor.advance_n(3);
            return Ok(Token::Ellipsis);
        }

        let token = match a {
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'&' => Token::Amp,
            b'|' => Token::Pipe,
            b'^' => Token::Caret,
            b'~' => Token::Tilde,
            b'!' => Token::Bang,
            b'<' => Token::Lt,
            b'>' => Token::Gt,
            b'=' => Token::Assign,
            b'?' => Token::Question,
            b':' => Token::Colon,
            b';' => Token::Semi,
            b',' => Token::Comma,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            _ => {
                return Err(LexError::UnexpectedChar {
                    line: self.cursor.line(),
                    ch: a as char,
                })
            }
        };
        self.cursor.advance();
        Ok(token)
    }
}

/// Resolves the byte following a backslash.
///
/// Only `\n`, `\t`, `\r` and `\0` are special; any other byte stands for
/// itself (so `\\` and `\'` work without their own cases). Octal and hex
/// escapes are not part of the language.
fn escape_value(b: u8) -> u8 {
    match b {
        b'n' => b'\n',
        b't' => b'\t',
        b'r' => b'\r',
        b'0' => 0,
        other => other,
    }
}

fn hex_digit_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}
