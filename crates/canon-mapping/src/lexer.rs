//! Tokenizer for the mapping expression language
//!
//! Every token keeps the byte span it was read from, so tools that rewrite
//! expression source (such as the transform patcher) can substitute exact
//! tokens without touching anything else.

use crate::{Error, Result};
use std::ops::Range;

/// Token categories
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare field name or keyword (`name`, `and`, `true`)
    Name(String),
    /// Backtick-quoted field name
    QuotedName(String),
    /// `$name`; `$` alone is the empty name and `$$` is `"$"`
    Variable(String),
    /// String literal
    Str(String),
    /// Numeric literal
    Number(f64),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Question,
    Amp,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// A token and the byte span it occupies in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    /// Whether this token is a bare name that is not a reserved word
    #[must_use]
    pub fn is_field_name(&self) -> bool {
        matches!(&self.kind, TokenKind::Name(name) if !is_keyword(name))
    }
}

/// Reserved words that are never field references
#[must_use]
pub fn is_keyword(name: &str) -> bool {
    matches!(name, "and" | "or" | "true" | "false" | "null")
}

/// Whether `name` can be written as a bare (unquoted) field name
#[must_use]
pub fn is_bare_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_') && !is_keyword(name)
}

/// Split source into tokens, skipping whitespace and `/* */` comments
///
/// # Errors
///
/// Returns [`Error::Syntax`] for unterminated strings or comments and for
/// characters that cannot start a token.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while let Some(c) = self.peek_char() {
            let start = self.pos;

            if c.is_whitespace() {
                self.pos += c.len_utf8();
                continue;
            }

            if self.source[self.pos..].starts_with("/*") {
                self.skip_comment()?;
                continue;
            }

            let kind = match c {
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                ';' => self.single(TokenKind::Semicolon),
                '.' => self.single(TokenKind::Dot),
                '?' => self.single(TokenKind::Question),
                '&' => self.single(TokenKind::Amp),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),
                '=' => self.single(TokenKind::Eq),
                '!' => {
                    if self.bytes.get(self.pos + 1) == Some(&b'=') {
                        self.pos += 2;
                        TokenKind::NotEq
                    } else {
                        return Err(Error::syntax(start, "expected '=' after '!'"));
                    }
                }
                '<' => self.with_optional_eq(TokenKind::Lt, TokenKind::LtEq),
                '>' => self.with_optional_eq(TokenKind::Gt, TokenKind::GtEq),
                '"' | '\'' => self.string(c)?,
                '`' => self.quoted_name()?,
                '$' => self.variable(),
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_alphabetic() || c == '_' => TokenKind::Name(self.take_name()),
                other => {
                    return Err(Error::syntax(start, format!("unexpected character '{other}'")));
                }
            };

            self.tokens.push(Token {
                kind,
                span: start..self.pos,
            });
        }

        Ok(self.tokens)
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn with_optional_eq(&mut self, plain: TokenKind, with_eq: TokenKind) -> TokenKind {
        if self.bytes.get(self.pos + 1) == Some(&b'=') {
            self.pos += 2;
            with_eq
        } else {
            self.pos += 1;
            plain
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        let start = self.pos;
        match self.source[self.pos + 2..].find("*/") {
            Some(end) => {
                self.pos += 2 + end + 2;
                Ok(())
            }
            None => Err(Error::syntax(start, "unterminated comment")),
        }
    }

    fn take_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.source[start..self.pos].to_string()
    }

    fn variable(&mut self) -> TokenKind {
        self.pos += 1;
        if self.bytes.get(self.pos) == Some(&b'$') {
            self.pos += 1;
            return TokenKind::Variable("$".to_string());
        }
        TokenKind::Variable(self.take_name())
    }

    fn quoted_name(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.pos += 1;
        match self.source[self.pos..].find('`') {
            Some(end) => {
                let name = self.source[self.pos..self.pos + end].to_string();
                self.pos += end + 1;
                Ok(TokenKind::QuotedName(name))
            }
            None => Err(Error::syntax(start, "unterminated quoted name")),
        }
    }

    fn number(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.eat_digits();

        if self.bytes.get(self.pos) == Some(&b'.')
            && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
        {
            self.pos += 1;
            self.eat_digits();
        }

        if matches!(self.bytes.get(self.pos), Some(b'e' | b'E')) {
            let mut lookahead = self.pos + 1;
            if matches!(self.bytes.get(lookahead), Some(b'+' | b'-')) {
                lookahead += 1;
            }
            if self.bytes.get(lookahead).is_some_and(u8::is_ascii_digit) {
                self.pos = lookahead;
                self.eat_digits();
            }
        }

        self.source[start..self.pos]
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|e| Error::syntax(start, format!("invalid number: {e}")))
    }

    fn eat_digits(&mut self) {
        while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
    }

    fn string(&mut self, quote: char) -> Result<TokenKind> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();

        loop {
            let Some(c) = self.peek_char() else {
                return Err(Error::syntax(start, "unterminated string literal"));
            };
            self.pos += c.len_utf8();

            if c == quote {
                return Ok(TokenKind::Str(value));
            }

            if c != '\\' {
                value.push(c);
                continue;
            }

            let Some(escaped) = self.peek_char() else {
                return Err(Error::syntax(start, "unterminated string literal"));
            };
            self.pos += escaped.len_utf8();
            match escaped {
                '"' => value.push('"'),
                '\'' => value.push('\''),
                '\\' => value.push('\\'),
                '/' => value.push('/'),
                'b' => value.push('\u{0008}'),
                'f' => value.push('\u{000C}'),
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                't' => value.push('\t'),
                'u' => value.push(self.unicode_escape()?),
                other => {
                    return Err(Error::syntax(
                        self.pos - other.len_utf8() - 1,
                        format!("unsupported escape sequence '\\{other}'"),
                    ));
                }
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char> {
        let start = self.pos;
        let hex = self
            .source
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| Error::syntax(start, "truncated unicode escape"))?;
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| Error::syntax(start, format!("invalid unicode escape '{hex}'")))?;
        self.pos += 4;
        char::from_u32(code)
            .ok_or_else(|| Error::syntax(start, format!("invalid code point U+{code:04X}")))
    }
}
