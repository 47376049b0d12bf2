//! Error types.

use thiserror::Error;

use crate::parser::GrammarContext;

/// What stage of parsing rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Illegal character, unterminated string, malformed number, bracket
    /// suffix or line ending.
    Lex,
    /// A token that the named production does not accept.
    Grammar(GrammarContext),
}

/// Error returned when text cannot be parsed.
///
/// `line` is 1-based and is the line the tokenizer was on when the
/// offending token was produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn lex(line: usize, message: impl Into<String>) -> Self {
        ParseError { kind: ParseErrorKind::Lex, line, message: message.into() }
    }

    pub(crate) fn grammar(context: GrammarContext, line: usize, message: impl Into<String>) -> Self {
        ParseError { kind: ParseErrorKind::Grammar(context), line, message: message.into() }
    }
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("could not decompress: {0}")]
    Compression(String),

    #[error("compressed payload truncated: header says {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid diff document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
