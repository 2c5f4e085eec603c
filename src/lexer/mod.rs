//! Lexical analysis module
//!
//! A single left-to-right scan that turns DSL text into [`Token`]s. The lexer
//! never fails outright: bad characters are recorded as diagnostics and the
//! scan skips one character and carries on, so one pass surfaces every
//! lexical problem in the input. Only oversize input and an expired
//! [`Deadline`] stop the scan.

/// Error types for lexer operations
pub mod error;
/// Token definitions and the keyword table
pub mod token;

pub use error::LexError;
pub use token::{Token, TokenKind};

use crate::config::{Deadline, Limits};
use crate::diagnostic::ValidationError;
use crate::sanitize::display_safe;

/// Longest word quoted back in an unexpected-character diagnostic
const MAX_CONTEXT_CHARS: usize = 60;

/// Output of a lexer run
#[derive(Debug, Clone, PartialEq)]
pub struct LexOutput {
    /// Tokens, always terminated by [`TokenKind::Eof`]
    pub tokens: Vec<Token>,
    /// Lexical diagnostics in source order
    pub errors: Vec<ValidationError>,
    /// The scan was stopped by a whole-input failure
    pub fatal: bool,
}

/// Tokenize with default limits and a fresh deadline
pub fn tokenize(source: &str) -> LexOutput {
    let limits = Limits::default();
    Lexer::new(source, &limits, Deadline::start(limits.max_parse_time)).tokenize()
}

/// Lexer for trace rule expressions
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    line: usize,
    column: usize,
    limits: &'a Limits,
    deadline: Deadline,
    tokens: Vec<Token>,
    errors: Vec<ValidationError>,
    /// End offset and rendered form of the last quoted word
    context: Option<(usize, String)>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `input`
    pub fn new(input: &'a str, limits: &'a Limits, deadline: Deadline) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
            column: 1,
            limits,
            deadline,
            tokens: Vec::new(),
            errors: Vec::new(),
            context: None,
        }
    }

    /// Scan the whole input
    pub fn tokenize(mut self) -> LexOutput {
        if self.input.len() > self.limits.max_total_length {
            self.record(
                LexError::InputTooLarge {
                    len: self.input.len(),
                    limit: self.limits.max_total_length,
                },
                1,
                1,
                1,
            );
            return self.finish(true);
        }

        while let Some(ch) = self.peek() {
            if self.deadline.expired() {
                // a timeout replaces everything found so far
                self.errors.clear();
                self.record(
                    LexError::Timeout {
                        limit_ms: self.deadline.budget().as_millis(),
                    },
                    1,
                    1,
                    1,
                );
                return self.finish(true);
            }

            match ch {
                c if c.is_whitespace() => {
                    self.advance();
                }
                '/' if self.peek_nth(1) == Some('/') => self.skip_comment(),
                c if c.is_ascii_alphabetic() || c == '_' => self.lex_word(),
                '"' => self.lex_string(),
                c if c.is_ascii_digit() => self.lex_number(),
                c => self.lex_symbol(c),
            }
        }

        self.finish(false)
    }

    fn finish(mut self, fatal: bool) -> LexOutput {
        self.tokens.push(Token::eof(self.line, self.column));
        LexOutput {
            tokens: self.tokens,
            errors: self.errors,
            fatal,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.position..].chars().nth(n)
    }

    /// Consume one character, tracking line and column
    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.advance();
        }
    }

    fn record(&mut self, error: LexError, line: usize, column: usize, len: usize) {
        self.errors.push(error.into_diagnostic(line, column, len));
    }

    fn emit(&mut self, kind: TokenKind, text: String, line: usize, column: usize, start: usize) {
        let len = self.position - start;
        self.tokens.push(Token::new(kind, text, line, column, len));
    }

    fn skip_comment(&mut self) {
        self.skip_while(|c| c != '\n');
    }

    /// Identifier or keyword
    ///
    /// The length limit is checked before each character is consumed, so an
    /// over-long word is rejected at its start without buffering the rest.
    fn lex_word(&mut self) {
        let (start, line, column) = (self.position, self.line, self.column);
        let limit = self.limits.max_identifier_length;
        let mut count = 0;

        while let Some(c) = self.peek() {
            if !is_word_char(c) {
                break;
            }
            if count >= limit {
                let kept = self.position;
                self.skip_while(is_word_char);
                self.record(LexError::IdentifierTooLong { limit }, line, column, self.position - start);
                let text = self.input[start..kept].to_string();
                self.emit(TokenKind::Identifier, text, line, column, start);
                return;
            }
            self.advance();
            count += 1;
        }

        let text = &self.input[start..self.position];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        self.emit(kind, text.to_string(), line, column, start);
    }

    fn lex_string(&mut self) {
        let (start, line, column) = (self.position, self.line, self.column);
        let limit = self.limits.max_string_length;
        let mut value = String::new();
        let mut chars = 0usize;
        let mut too_long = false;

        self.advance(); // opening quote
        loop {
            let ch = match self.advance() {
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some(c @ ('"' | '\\')) => vec![c],
                    // unknown escapes stay verbatim so regex classes like \d survive
                    Some(c) => vec!['\\', c],
                    None => vec![],
                },
                Some(c) => vec![c],
                None => {
                    self.record(LexError::UnterminatedString, line, column, self.position - start);
                    return;
                }
            };
            for c in ch {
                if chars >= limit {
                    too_long = true;
                    continue;
                }
                value.push(c);
                chars += 1;
            }
        }

        if too_long {
            self.record(LexError::StringTooLong { limit }, line, column, self.position - start);
        }
        self.emit(TokenKind::String, value, line, column, start);
    }

    fn lex_number(&mut self) {
        let (start, line, column) = (self.position, self.line, self.column);
        self.skip_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.skip_while(|c| c.is_ascii_digit());
        }
        let text = self.input[start..self.position].to_string();
        self.emit(TokenKind::Number, text, line, column, start);
    }

    fn lex_symbol(&mut self, ch: char) {
        let (start, line, column) = (self.position, self.line, self.column);

        // two-character operators win over their one-character prefixes
        let pair = match (ch, self.peek_nth(1)) {
            ('=', Some('=')) => Some(TokenKind::Eq),
            ('!', Some('=')) => Some(TokenKind::NotEq),
            ('>', Some('=')) => Some(TokenKind::Gte),
            ('<', Some('=')) => Some(TokenKind::Lte),
            _ => None,
        };
        if let Some(kind) = pair {
            self.advance();
            self.advance();
            self.emit(kind, kind.literal().to_string(), line, column, start);
            return;
        }

        let single = match ch {
            '>' => Some(TokenKind::Gt),
            '<' => Some(TokenKind::Lt),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '.' => Some(TokenKind::Dot),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        match single {
            Some(kind) => {
                self.advance();
                self.emit(kind, kind.literal().to_string(), line, column, start);
            }
            None => {
                let error = LexError::UnexpectedCharacter {
                    ch: display_safe(&ch.to_string(), MAX_CONTEXT_CHARS),
                    context: self.word_context(),
                };
                let mut diagnostic = error.into_diagnostic(line, column, ch.len_utf8());
                if ch == '=' {
                    diagnostic = diagnostic.with_suggestion("Use '==' to compare values");
                }
                self.errors.push(diagnostic);
                self.advance();
            }
        }
    }

    /// Rendered word around the current position
    ///
    /// A run of bad characters inside one word reuses the first rendering, so
    /// whitespace-free input stays linear.
    fn word_context(&mut self) -> String {
        if let Some((end, rendered)) = &self.context {
            if self.position < *end {
                return rendered.clone();
            }
        }
        let (begin, end) = self.word_bounds();
        let rendered = display_safe(&self.input[begin..end], MAX_CONTEXT_CHARS);
        self.context = Some((end, rendered.clone()));
        rendered
    }

    /// Byte range of the whitespace-delimited word around the current position
    fn word_bounds(&self) -> (usize, usize) {
        let input = self.input;
        let begin = input[..self.position]
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let end = input[self.position..]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, _)| self.position + i)
            .unwrap_or(input.len());
        (begin, end)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
