//! Hand-written tokenizer for entities text.
//!
//! Tokens borrow nothing: each one records its byte range in the input and
//! the line it started on. The parser copies the bytes it keeps into the
//! tree's text arena.
//!
//! | Input | Token |
//! |---|---|
//! | `// ...` to end of line | `Comment` |
//! | `"..."` (single line) | `ValueString` |
//! | `-12.5e+3` | `ValueNumber` |
//! | `true` `false` `NULL` | `ValueKeyword` |
//! | `name`, `item[12]` | `Identifier` |
//! | `{` `}` `=` `;` | `BraceOpen` `BraceClose` `Assignment` `Terminal` |

use std::fmt;

use memchr::{memchr2, memchr3};
use phf::phf_set;

use crate::error::ParseError;

static KEYWORDS: phf::Set<&'static [u8]> = phf_set! {
    b"true",
    b"false",
    b"NULL",
};

/// Token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    End,
    Identifier,
    ValueString,
    ValueNumber,
    ValueKeyword,
    Comment,
    BraceOpen,
    BraceClose,
    Assignment,
    Terminal,
}

impl TokenKind {
    /// Whether the token is a literal value.
    #[inline]
    pub fn is_value(self) -> bool {
        matches!(self, TokenKind::ValueString | TokenKind::ValueNumber | TokenKind::ValueKeyword)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::End => "end of input",
            TokenKind::Identifier => "identifier",
            TokenKind::ValueString => "string",
            TokenKind::ValueNumber => "number",
            TokenKind::ValueKeyword => "keyword",
            TokenKind::Comment => "comment",
            TokenKind::BraceOpen => "'{'",
            TokenKind::BraceClose => "'}'",
            TokenKind::Assignment => "'='",
            TokenKind::Terminal => "';'",
        };
        f.write_str(s)
    }
}

/// A token: kind, byte range into the input, and 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Token {
    /// The token's bytes within `input`.
    #[inline]
    pub fn text<'a>(&self, input: &'a [u8]) -> &'a [u8] {
        &input[self.start..self.end]
    }
}

/// Streaming tokenizer over a byte buffer.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Tokenizer { input, pos: 0, line: 1 }
    }

    /// Line the tokenizer is currently on.
    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Produce the next token. Once the input is exhausted every call
    /// returns `End`.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace()?;

        let start = self.pos;
        let Some(&b) = self.input.get(start) else {
            return Ok(self.token(TokenKind::End, start));
        };

        match b {
            b'{' => self.single(TokenKind::BraceOpen),
            b'}' => self.single(TokenKind::BraceClose),
            b'=' => self.single(TokenKind::Assignment),
            b';' => self.single(TokenKind::Terminal),
            b'/' => self.comment(),
            b'"' => self.string(),
            b'-' | b'0'..=b'9' => self.number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier(),
            _ => Err(ParseError::lex(self.line, format!("illegal character {}", describe(b)))),
        }
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token { kind, start, end: self.pos, line: self.line }
    }

    fn single(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 1;
        Ok(self.token(kind, start))
    }

    fn skip_whitespace(&mut self) -> Result<(), ParseError> {
        while let Some(&b) = self.input.get(self.pos) {
            match b {
                b' ' | b'\t' => self.pos += 1,
                b'\n' => {
                    self.pos += 1;
                    self.line += 1;
                }
                b'\r' => {
                    if self.input.get(self.pos + 1) != Some(&b'\n') {
                        return Err(ParseError::lex(self.line, "carriage return not followed by line feed"));
                    }
                    self.pos += 2;
                    self.line += 1;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn comment(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        if self.input.get(start + 1) != Some(&b'/') {
            return Err(ParseError::lex(self.line, "illegal character '/'"));
        }
        let rest = &self.input[start..];
        self.pos = match memchr2(b'\n', b'\r', rest) {
            Some(offset) => start + offset,
            None => self.input.len(),
        };
        Ok(self.token(TokenKind::Comment, start))
    }

    fn string(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let rest = &self.input[start + 1..];
        match memchr3(b'"', b'\n', b'\r', rest) {
            Some(offset) if rest[offset] == b'"' => {
                self.pos = start + 1 + offset + 1;
                Ok(self.token(TokenKind::ValueString, start))
            }
            _ => Err(ParseError::lex(self.line, "unterminated string")),
        }
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        if self.input[start] == b'-' {
            self.pos += 1;
        }
        if !matches!(self.input.get(self.pos), Some(b'0'..=b'9')) {
            return Err(ParseError::lex(self.line, "malformed number"));
        }

        let mut seen_dot = false;
        while let Some(&b) = self.input.get(self.pos) {
            match b {
                b'0'..=b'9' | b'e' | b'E' | b'+' | b'-' => self.pos += 1,
                b'.' if !seen_dot => {
                    seen_dot = true;
                    self.pos += 1;
                }
                b'.' => return Err(ParseError::lex(self.line, "malformed number: second '.'")),
                _ => break,
            }
        }
        Ok(self.token(TokenKind::ValueNumber, start))
    }

    fn identifier(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        while let Some(&b) = self.input.get(self.pos) {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.input.get(self.pos) == Some(&b'[') {
            self.pos += 1;
            let digits = self.pos;
            while matches!(self.input.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            if self.pos == digits || self.input.get(self.pos) != Some(&b']') {
                return Err(ParseError::lex(self.line, "malformed array index"));
            }
            self.pos += 1;
            return Ok(self.token(TokenKind::Identifier, start));
        }

        let kind = if KEYWORDS.contains(&self.input[start..self.pos]) {
            TokenKind::ValueKeyword
        } else {
            TokenKind::Identifier
        };
        Ok(self.token(kind, start))
    }
}

fn describe(b: u8) -> String {
    if b.is_ascii_graphic() {
        format!("'{}'", b as char)
    } else {
        format!("0x{b:02X}")
    }
}
