//! Diagnostics produced by every stage of the pipeline.
//!
//! Static stages (scanner, parser, resolver) report `[line N] Error...`
//! lines; runtime errors put the message first and the line after it.
//! Nothing here prints: the caller decides where diagnostics go.

use std::fmt;
use std::io;
use thiserror::Error;

use log::debug;

use crate::token::{Token, TokenType};

/// Where a static diagnostic points in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// The offending token is the end-of-file marker.
    End,

    /// The offending token's raw lexeme.
    Lexeme(String),

    /// No token is associated with the diagnostic.
    Nowhere,
}

impl Location {
    /// Location description for a diagnostic reported at `token`.
    pub fn of(token: &Token<'_>) -> Self {
        if token.token_type == TokenType::EOF {
            Location::End
        } else {
            Location::Lexeme(token.lexeme.to_owned())
        }
    }

    /// The bare description: `at end`, `at 'x'`, or the empty string.
    pub fn describe(&self) -> String {
        match self {
            Location::End => "at end".to_owned(),
            Location::Lexeme(lexeme) => format!("at '{}'", lexeme),
            Location::Nowhere => String::new(),
        }
    }
}

impl fmt::Display for Location {
    /// Renders with a leading space so it slots between `Error` and `:`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Nowhere => Ok(()),
            other => write!(f, " {}", other.describe()),
        }
    }
}

/// Any failure a Lox run can report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    #[error("[line {line}] Error: {message}")]
    Lex { message: String, line: usize },

    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        line: usize,
        location: Location,
    },

    /// Found by the resolver; the program was never run.
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        line: usize,
        location: Location,
    },

    /// Raised while executing; aborts the current run.
    #[error("{message}\n[line {line}]")]
    Runtime { message: String, line: usize },

    /// Writing `print` output failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LoxError {
    /// Scanner diagnostic; carries no location.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        debug!("lex error on line {}: {}", line, message);

        LoxError::Lex { message, line }
    }

    /// Parser diagnostic pointing at `token`.
    pub fn parse<S: Into<String>>(token: &Token<'_>, msg: S) -> Self {
        let message: String = msg.into();

        debug!("parse error on line {}: {}", token.line, message);

        LoxError::Parse {
            message,
            line: token.line,
            location: Location::of(token),
        }
    }

    /// Resolver diagnostic pointing at `lexeme`.
    pub fn resolve<S: Into<String>>(line: usize, lexeme: &str, msg: S) -> Self {
        let message: String = msg.into();

        debug!("resolve error on line {}: {}", line, message);

        LoxError::Resolve {
            message,
            line,
            location: Location::Lexeme(lexeme.to_owned()),
        }
    }

    pub fn runtime<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        debug!("runtime error on line {}: {}", line, message);

        LoxError::Runtime { message, line }
    }

    /// Source line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            LoxError::Lex { line, .. }
            | LoxError::Parse { line, .. }
            | LoxError::Resolve { line, .. }
            | LoxError::Runtime { line, .. } => Some(*line),
            LoxError::Io(_) => None,
        }
    }

    /// The bare message without line or location decoration.
    pub fn message(&self) -> String {
        match self {
            LoxError::Lex { message, .. }
            | LoxError::Parse { message, .. }
            | LoxError::Resolve { message, .. }
            | LoxError::Runtime { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Lexical, syntactic and resolution errors are static: they stop a
    /// program before it runs.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. }
        )
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_at_end_renders_location() {
        let eof = Token::new(TokenType::EOF, "", 3);
        let err = LoxError::parse(&eof, "Expected expression");

        assert_eq!(err.to_string(), "[line 3] Error at end: Expected expression");
        assert!(err.is_static());
    }

    #[test]
    fn parse_error_at_lexeme_renders_location() {
        let tok = Token::new(TokenType::EQUAL, "=", 1);
        let err = LoxError::parse(&tok, "Invalid assignment target");

        assert_eq!(
            err.to_string(),
            "[line 1] Error at '=': Invalid assignment target"
        );
    }

    #[test]
    fn runtime_error_puts_line_after_message() {
        let err = LoxError::runtime(7, "Operands must be numbers");

        assert_eq!(err.to_string(), "Operands must be numbers\n[line 7]");
        assert_eq!(err.line(), Some(7));
        assert!(!err.is_static());
    }

    #[test]
    fn lex_error_has_no_location() {
        let err = LoxError::lex(2, "Unexpected character: $");

        assert_eq!(err.to_string(), "[line 2] Error: Unexpected character: $");
        assert_eq!(err.message(), "Unexpected character: $");
    }
}
