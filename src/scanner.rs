//! Streaming lexer for Lox source text.
//!
//! [`Scanner`] is an iterator of `Result<Token<'a>>`: lexical errors are
//! yielded in place and scanning carries on after them, so a caller sees
//! every problem in one pass.  The stream always finishes with exactly one
//! `EOF` token and is fused afterwards.
//!
//! Lexemes borrow from the source text; nothing is copied except the
//! contents of string literals.
//!
//! ```rust
//! use rox::scanner::Scanner;
//!
//! for result in Scanner::new("print 123; // example") {
//!     match result {
//!         Ok(token) => println!("{}", token),
//!         Err(err) => eprintln!("{}", err),
//!     }
//! }
//! ```

use std::iter::FusedIterator;

use log::{debug, info};
use memchr::{memchr, memchr_iter, memmem};
use phf::phf_map;

use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};

/// Reserved words, looked up by exact byte match once an identifier ends.
static RESERVED: phf::Map<&'static [u8], TokenType> = phf_map! {
    b"and" => TokenType::AND,
    b"class" => TokenType::CLASS,
    b"else" => TokenType::ELSE,
    b"false" => TokenType::FALSE,
    b"for" => TokenType::FOR,
    b"fun" => TokenType::FUN,
    b"if" => TokenType::IF,
    b"nil" => TokenType::NIL,
    b"or" => TokenType::OR,
    b"print" => TokenType::PRINT,
    b"return" => TokenType::RETURN,
    b"super" => TokenType::SUPER,
    b"this" => TokenType::THIS,
    b"true" => TokenType::TRUE,
    b"var" => TokenType::VAR,
    b"while" => TokenType::WHILE,
};

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Lexer state over one source buffer.
pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    /// First byte of the lexeme being scanned.
    lexeme_start: usize,
    /// Next byte to examine.
    pos: usize,
    line: usize,
    finished: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        info!("Scanner created over {} bytes", source.len());

        Self {
            source,
            bytes: source.as_bytes(),
            lexeme_start: 0,
            pos: 0,
            line: 1,
            finished: false,
        }
    }

    /// Scan `source` to completion.  Every token (always ending in `EOF`) is
    /// returned alongside every lexical error met on the way.
    pub fn scan_all(source: &'a str) -> (Vec<Token<'a>>, Vec<LoxError>) {
        let mut tokens: Vec<Token<'a>> = Vec::new();
        let mut errors: Vec<LoxError> = Vec::new();

        for result in Scanner::new(source) {
            match result {
                Ok(token) => tokens.push(token),
                Err(e) => errors.push(e),
            }
        }

        info!(
            "Scanned {} tokens with {} error(s)",
            tokens.len(),
            errors.len()
        );

        (tokens, errors)
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn lookahead(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.current()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> bool {
        let hit = self.current() == Some(expected);
        if hit {
            self.pos += 1;
        }
        hit
    }

    /// `with_eq` if the next byte is `=`, otherwise `alone`.
    fn pick(&mut self, with_eq: TokenType, alone: TokenType) -> TokenType {
        if self.eat(b'=') {
            with_eq
        } else {
            alone
        }
    }

    fn lexeme(&self) -> &'a str {
        &self.source[self.lexeme_start..self.pos]
    }

    /// Consume one lexeme.  `Ok(None)` means it was trivia (whitespace or a
    /// comment) and produced no token.
    fn lex(&mut self) -> Result<Option<TokenType>> {
        let Some(b) = self.bump() else {
            return Ok(None);
        };

        let kind = match b {
            b'(' => TokenType::LEFT_PAREN,
            b')' => TokenType::RIGHT_PAREN,
            b'{' => TokenType::LEFT_BRACE,
            b'}' => TokenType::RIGHT_BRACE,
            b',' => TokenType::COMMA,
            b'.' => TokenType::DOT,
            b'-' => TokenType::MINUS,
            b'+' => TokenType::PLUS,
            b';' => TokenType::SEMICOLON,
            b'*' => TokenType::STAR,
            b'!' => self.pick(TokenType::BANG_EQUAL, TokenType::BANG),
            b'=' => self.pick(TokenType::EQUAL_EQUAL, TokenType::EQUAL),
            b'<' => self.pick(TokenType::LESS_EQUAL, TokenType::LESS),
            b'>' => self.pick(TokenType::GREATER_EQUAL, TokenType::GREATER),
            b'/' if self.eat(b'/') => {
                self.skip_line_comment();
                return Ok(None);
            }
            b'/' if self.eat(b'*') => {
                self.skip_block_comment()?;
                return Ok(None);
            }
            b'/' => TokenType::SLASH,
            b' ' | b'\r' | b'\t' | b'\n' => return Ok(None),
            b'"' => self.string()?,
            b'0'..=b'9' => self.number(),
            b if is_ident_start(b) => self.identifier(),
            _ => return Err(self.unexpected()),
        };

        Ok(Some(kind))
    }

    /// The newline itself is left in place so it still bumps the line count.
    fn skip_line_comment(&mut self) {
        self.pos = match memchr(b'\n', &self.bytes[self.pos..]) {
            Some(offset) => self.pos + offset,
            None => self.bytes.len(),
        };
    }

    /// `/* ... */`, entered just past the opener.  The first `*/` closes it.
    fn skip_block_comment(&mut self) -> Result<()> {
        let rest = &self.bytes[self.pos..];
        let body_len = memmem::find(rest, b"*/");
        let skipped = &rest[..body_len.unwrap_or(rest.len())];
        self.line += memchr_iter(b'\n', skipped).count();

        match body_len {
            Some(len) => {
                self.pos += len + 2;
                Ok(())
            }
            None => {
                self.pos = self.bytes.len();
                Err(LoxError::lex(self.line, "Unterminated comment."))
            }
        }
    }

    /// String literal, entered just past the opening quote.  Literals may
    /// span lines; the token is reported on the line where it ends.
    fn string(&mut self) -> Result<TokenType> {
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(_) => {}
                None => return Err(LoxError::lex(self.line, "Unterminated string.")),
            }
        }

        // Both quotes are ASCII, so these are char boundaries.
        let body = &self.source[self.lexeme_start + 1..self.pos - 1];

        Ok(TokenType::STRING(body.to_owned()))
    }

    /// Digits with an optional fraction.  A `.` not followed by a digit is
    /// left for the next token.
    fn number(&mut self) -> TokenType {
        self.skip_digits();

        let has_fraction = self.current() == Some(b'.')
            && self.lookahead().is_some_and(|b| b.is_ascii_digit());

        if has_fraction {
            self.pos += 1;
            self.skip_digits();
        }

        // Only ASCII digits and at most one interior dot reach here.
        TokenType::NUMBER(self.lexeme().parse().unwrap_or_default())
    }

    fn skip_digits(&mut self) {
        while self.current().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn identifier(&mut self) -> TokenType {
        while self.current().is_some_and(is_ident_continue) {
            self.pos += 1;
        }

        RESERVED
            .get(self.lexeme().as_bytes())
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER)
    }

    /// Report the offending character whole, even when it is multi-byte, so
    /// scanning resumes on a char boundary.
    fn unexpected(&mut self) -> LoxError {
        while self.pos < self.bytes.len() && !self.source.is_char_boundary(self.pos) {
            self.pos += 1;
        }

        LoxError::lex(
            self.line,
            format!("Unexpected character: {}", self.lexeme()),
        )
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while self.pos < self.bytes.len() {
            self.lexeme_start = self.pos;

            match self.lex() {
                Ok(Some(kind)) => {
                    debug!("Scanned {:?} on line {}", kind, self.line);
                    return Some(Ok(Token::new(kind, self.lexeme(), self.line)));
                }
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }

        self.finished = true;

        Some(Ok(Token::new(TokenType::EOF, "", self.line)))
    }
}

impl<'a> FusedIterator for Scanner<'a> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<&'static str> {
        Scanner::new(src)
            .filter_map(|r| r.ok())
            .map(|t| t.token_type.name())
            .collect()
    }

    #[test]
    fn trailing_dot_is_not_part_of_number() {
        let (tokens, errors) = Scanner::scan_all("123.");

        assert!(errors.is_empty());
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].lexeme, "123");
        assert_eq!(tokens[1].token_type, TokenType::DOT);
    }

    #[test]
    fn block_comment_spanning_lines_counts_lines() {
        let (tokens, errors) = Scanner::scan_all("/* one\ntwo */ x");

        assert!(errors.is_empty());
        assert_eq!(tokens[0].lexeme, "x");
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn unterminated_block_comment_is_reported() {
        let (tokens, errors) = Scanner::scan_all("a /* never closed");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "Unterminated comment.");
        assert_eq!(tokens.last().map(|t| t.token_type.name()), Some("EOF"));
    }

    #[test]
    fn block_comments_do_not_nest() {
        assert_eq!(kinds("/* a /* b */ c */"), vec!["IDENTIFIER", "STAR", "SLASH", "EOF"]);
    }

    #[test]
    fn non_ascii_character_is_one_error() {
        let (tokens, errors) = Scanner::scan_all("a é b");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "Unexpected character: é");
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn scanner_is_fused_after_eof() {
        let mut scanner = Scanner::new("");

        assert!(matches!(scanner.next(), Some(Ok(_))));
        assert!(scanner.next().is_none());
        assert!(scanner.next().is_none());
    }
}
