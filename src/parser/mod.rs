//! Recursive-descent parser for trace rule expressions
//!
//! ```text
//! expression  := term (("and" | "or") term)*
//! term        := "not" term | spanCheck
//! spanCheck   := "trace" "." ( "has" "(" name ")" whereClause*
//!                            | "count" "(" name ")" comparator countOperand )
//! whereClause := "." "where" "(" "not"? name (comparator value)? ")"
//! ```
//!
//! `and` and `or` share one precedence level and chain to the left. Every
//! grammar rule returns a [`PResult`]; a failed rule has already recorded its
//! diagnostic, and the expression loop skips ahead to the next `and`/`or` so
//! one pass reports as many problems as possible.

/// Error types for parser operations
pub mod error;
/// Lint checks producing warnings and hints
pub mod validate;

pub use error::ParseError;

use crate::ast::{
    AttributeTest, Comparator, CountOperand, Literal, LogicalOp, RegexLiteral, RuleExpression,
    WhereClause,
};
use crate::config::{Deadline, Limits};
use crate::diagnostic::{ParseResult, ValidationError};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::pattern::safe_regex_compile;
use crate::sanitize::display_safe;

/// Longest token text quoted back in a diagnostic
const MAX_QUOTED_TOKEN_CHARS: usize = 60;

/// Why a grammar rule gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseAbort {
    /// Syntax error, already recorded; the caller may resynchronise
    Recoverable,
    /// Depth limit or timeout; the whole compile stops
    Fatal,
}

type PResult<T> = Result<T, ParseAbort>;

/// A dotted name and where it was written
struct Name {
    text: String,
    first: Token,
    len: usize,
}

/// Lex and parse with default limits
pub fn parse_rule(source: &str) -> ParseResult {
    parse_rule_with_limits(source, &Limits::default())
}

/// Lex and parse under the given limits
///
/// One [`Deadline`] covers both lexing and parsing.
pub fn parse_rule_with_limits(source: &str, limits: &Limits) -> ParseResult {
    let deadline = Deadline::start(limits.max_parse_time);
    let lexed = Lexer::new(source, limits, deadline).tokenize();
    if lexed.fatal {
        return ParseResult::new(lexed.errors, None);
    }
    Parser::new(lexed.tokens, limits, deadline)
        .with_diagnostics(lexed.errors)
        .parse()
}

/// Parser over a token stream
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    timed_out: bool,
    limits: &'a Limits,
    deadline: Deadline,
    diagnostics: Vec<ValidationError>,
}

impl<'a> Parser<'a> {
    /// Create a parser; a missing end-of-input token is appended
    pub fn new(mut tokens: Vec<Token>, limits: &'a Limits, deadline: Deadline) -> Self {
        if !tokens.last().is_some_and(|t| t.is(TokenKind::Eof)) {
            let (line, column) = tokens
                .last()
                .map(|t| (t.line, t.column + t.len))
                .unwrap_or((1, 1));
            tokens.push(Token::eof(line, column));
        }
        Self {
            tokens,
            pos: 0,
            depth: 0,
            timed_out: false,
            limits,
            deadline,
            diagnostics: Vec::new(),
        }
    }

    /// Seed the result with diagnostics from an earlier stage
    pub fn with_diagnostics(mut self, diagnostics: Vec<ValidationError>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Parse the whole token stream
    pub fn parse(mut self) -> ParseResult {
        if self.check(TokenKind::Eof) {
            if self.diagnostics.is_empty() {
                let eof = self.peek().clone();
                return ParseResult::failed(ParseError::EmptyInput.at(&eof));
            }
            return ParseResult::new(self.diagnostics, None);
        }

        match self.parse_expression() {
            Ok(expr) => {
                if !self.check(TokenKind::Eof) {
                    let token = self.peek().clone();
                    let found = describe(&token);
                    self.diagnostics.push(ParseError::TrailingToken { found }.at(&token));
                }
                ParseResult::new(self.diagnostics, Some(expr))
            }
            Err(_) if self.timed_out => {
                let limit_ms = self.deadline.budget().as_millis();
                ParseResult::failed(ValidationError::whole_input(
                    ParseError::Timeout { limit_ms }.to_string(),
                ))
            }
            Err(_) => ParseResult::new(self.diagnostics, None),
        }
    }

    fn peek(&self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is(TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    /// Record `error` on `token` and classify the abort
    fn fail(&mut self, error: ParseError, token: &Token) -> ParseAbort {
        let abort = if error.is_fatal() {
            ParseAbort::Fatal
        } else {
            ParseAbort::Recoverable
        };
        self.diagnostics.push(error.at(token));
        abort
    }

    fn unexpected(&mut self, expected: &str) -> ParseAbort {
        let token = self.peek().clone();
        let error = ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: describe(&token),
        };
        self.fail(error, &token)
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn check_deadline(&mut self) -> PResult<()> {
        if self.deadline.expired() {
            self.timed_out = true;
            return Err(ParseAbort::Fatal);
        }
        Ok(())
    }

    /// Take one nesting level; released with [`Parser::leave`]
    fn enter(&mut self) -> PResult<()> {
        self.check_deadline()?;
        if self.depth >= self.limits.max_recursion_depth {
            let token = self.peek().clone();
            let limit = self.limits.max_recursion_depth;
            return Err(self.fail(ParseError::TooDeeplyNested { limit }, &token));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Skip to the next `and`/`or` after a failed term
    fn synchronize(&mut self) {
        while !matches!(
            self.peek().kind,
            TokenKind::And | TokenKind::Or | TokenKind::Eof
        ) {
            self.advance();
        }
    }

    fn parse_expression(&mut self) -> PResult<RuleExpression> {
        self.check_deadline()?;
        let mut held = 0;
        let result = self.parse_chain(&mut held);
        self.depth = self.depth.saturating_sub(held);
        result
    }

    /// Each chained operator holds one nesting level until the chain ends
    fn parse_chain(&mut self, held: &mut usize) -> PResult<RuleExpression> {
        let mut failed = false;
        let mut left = match self.parse_term() {
            Ok(term) => Some(term),
            Err(ParseAbort::Fatal) => return Err(ParseAbort::Fatal),
            Err(ParseAbort::Recoverable) => {
                failed = true;
                self.synchronize();
                None
            }
        };

        while matches!(self.peek().kind, TokenKind::And | TokenKind::Or) {
            let op_token = self.advance();
            let operator = if op_token.is(TokenKind::And) {
                LogicalOp::And
            } else {
                self.diagnostics.push(validate::check_or(&op_token));
                LogicalOp::Or
            };

            self.enter()?;
            *held += 1;

            match self.parse_term() {
                Ok(right) => {
                    left = left.map(|l| RuleExpression::binary(l, operator, right));
                }
                Err(ParseAbort::Fatal) => return Err(ParseAbort::Fatal),
                Err(ParseAbort::Recoverable) => {
                    failed = true;
                    left = None;
                    self.synchronize();
                }
            }
        }

        match left {
            Some(expr) if !failed => Ok(expr),
            _ => Err(ParseAbort::Recoverable),
        }
    }

    fn parse_term(&mut self) -> PResult<RuleExpression> {
        self.check_deadline()?;
        if !self.check(TokenKind::Not) {
            return self.parse_span_check();
        }

        self.advance();
        self.enter()?;
        let inner = self.parse_term();
        self.leave();
        Ok(RuleExpression::negate(inner?))
    }

    fn parse_span_check(&mut self) -> PResult<RuleExpression> {
        self.check_deadline()?;
        self.expect(TokenKind::Trace, "'trace'")?;
        self.expect(TokenKind::Dot, "'.'")?;
        match self.peek().kind {
            TokenKind::Has => {
                self.advance();
                self.parse_has()
            }
            TokenKind::Count => {
                self.advance();
                self.parse_count()
            }
            _ => Err(self.unexpected("'has' or 'count'")),
        }
    }

    fn parse_has(&mut self) -> PResult<RuleExpression> {
        self.expect(TokenKind::LParen, "'('")?;
        let span_name = self.parse_span_name()?;
        self.expect(TokenKind::RParen, "')'")?;

        let mut where_clauses = Vec::new();
        while self.check(TokenKind::Dot) {
            self.advance();
            self.expect(TokenKind::Where, "'where'")?;
            where_clauses.push(self.parse_where_clause()?);
        }

        Ok(RuleExpression::Has {
            span_name,
            where_clauses,
        })
    }

    fn parse_count(&mut self) -> PResult<RuleExpression> {
        self.expect(TokenKind::LParen, "'('")?;
        let span_name = self.parse_span_name()?;
        self.expect(TokenKind::RParen, "')'")?;

        let op_token = self.peek().clone();
        let operator = self.parse_comparator()?;
        if !operator.is_numeric() {
            let error = ParseError::InvalidCountOperator {
                operator: operator.as_str().to_string(),
            };
            return Err(self.fail(error, &op_token));
        }

        let token = self.peek().clone();
        let operand = match token.kind {
            TokenKind::Number => {
                self.advance();
                match token.text.parse::<u64>() {
                    Ok(value) => {
                        self.diagnostics
                            .extend(validate::check_count(operator, value, &token));
                        CountOperand::Literal { value }
                    }
                    Err(_) => {
                        let found = describe(&token);
                        return Err(self.fail(ParseError::InvalidCountOperand { found }, &token));
                    }
                }
            }
            TokenKind::Trace => {
                self.advance();
                self.expect(TokenKind::Dot, "'.'")?;
                self.expect(TokenKind::Count, "'count'")?;
                self.expect(TokenKind::LParen, "'('")?;
                let other = self.parse_span_name()?;
                self.expect(TokenKind::RParen, "')'")?;
                CountOperand::Count { span_name: other }
            }
            _ => {
                let found = describe(&token);
                return Err(self.fail(ParseError::InvalidCountOperand { found }, &token));
            }
        };

        Ok(RuleExpression::Count {
            span_name,
            operator,
            operand,
        })
    }

    fn parse_where_clause(&mut self) -> PResult<WhereClause> {
        self.expect(TokenKind::LParen, "'('")?;

        let negated = self.check(TokenKind::Not) && self.not_is_negation();
        if negated {
            self.advance();
        }
        let attribute = self.parse_dotted("attribute name")?;

        let test = if self.check(TokenKind::RParen) {
            AttributeTest::Truthy
        } else {
            let operator = self.parse_comparator()?;
            let value = self.parse_value(operator)?;
            if let Some(hint) = validate::check_where(
                &attribute.text,
                operator,
                &value,
                &attribute.first,
                attribute.len,
            ) {
                self.diagnostics.push(hint);
            }
            AttributeTest::Compare { operator, value }
        };

        self.expect(TokenKind::RParen, "')'")?;
        Ok(WhereClause {
            attribute: attribute.text,
            test,
            negated,
        })
    }

    /// Whether a leading `not` negates the test rather than naming the attribute
    ///
    /// `not in ["a"]` compares an attribute called `not`, while `not in == 1`
    /// negates a test on an attribute called `in`: a comparator word only
    /// acts as one when a value follows it.
    fn not_is_negation(&self) -> bool {
        let Some(next) = self.tokens.get(self.pos + 1) else {
            return false;
        };
        let comparator_word = matches!(next.kind, TokenKind::In | TokenKind::Matches)
            || (next.kind == TokenKind::Identifier && next.text == "contains");
        if !comparator_word {
            return next.kind.is_word();
        }
        !matches!(
            self.peek_kind_at(2),
            TokenKind::String
                | TokenKind::Number
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LBracket
        )
    }

    fn parse_span_name(&mut self) -> PResult<String> {
        let name = self.parse_dotted("operation name")?;
        if let Some(hint) = validate::check_span_name(&name.text, &name.first, name.len) {
            self.diagnostics.push(hint);
        }
        Ok(name.text)
    }

    /// `word ("." word)*`; keywords are allowed as segments
    fn parse_dotted(&mut self, what: &str) -> PResult<Name> {
        if !self.peek().kind.is_word() {
            return Err(self.unexpected(what));
        }
        let first = self.advance();
        let mut text = first.text.clone();
        let mut end = first.column + first.len;

        while self.check(TokenKind::Dot) && self.peek_kind_at(1).is_word() {
            self.advance();
            let segment = self.advance();
            text.push('.');
            text.push_str(&segment.text);
            if segment.line == first.line {
                end = segment.column + segment.len;
            }
        }

        let len = end.saturating_sub(first.column);
        Ok(Name { text, first, len })
    }

    fn parse_comparator(&mut self) -> PResult<Comparator> {
        let token = self.peek().clone();
        let operator = match token.kind {
            TokenKind::Eq => Comparator::Eq,
            TokenKind::NotEq => Comparator::NotEq,
            TokenKind::Gt => Comparator::Gt,
            TokenKind::Gte => Comparator::Gte,
            TokenKind::Lt => Comparator::Lt,
            TokenKind::Lte => Comparator::Lte,
            TokenKind::In => Comparator::In,
            TokenKind::Matches => Comparator::Matches,
            // contextual keyword: stays usable as an attribute name
            TokenKind::Identifier if token.text == "contains" => Comparator::Contains,
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.advance();
        Ok(operator)
    }

    fn parse_value(&mut self, operator: Comparator) -> PResult<Literal> {
        let token = self.peek().clone();
        let value = match token.kind {
            TokenKind::String if operator == Comparator::Matches => {
                self.advance();
                match safe_regex_compile(&token.text) {
                    Ok(regex) => Literal::Pattern(RegexLiteral::new(token.text.clone(), regex)),
                    Err(e) => return Err(self.fail(ParseError::from(e), &token)),
                }
            }
            TokenKind::LBracket => {
                if operator != Comparator::In {
                    let error = ParseError::ListNotAllowed {
                        operator: operator.as_str().to_string(),
                    };
                    return Err(self.fail(error, &token));
                }
                self.advance();
                self.parse_list()?
            }
            _ => self.parse_scalar()?,
        };

        let needs_string = matches!(operator, Comparator::Matches | Comparator::Contains);
        if needs_string && !matches!(value, Literal::String(_) | Literal::Pattern(_)) {
            let error = ParseError::StringRequired {
                operator: operator.as_str().to_string(),
            };
            return Err(self.fail(error, &token));
        }
        Ok(value)
    }

    fn parse_scalar(&mut self) -> PResult<Literal> {
        let token = self.peek().clone();
        let value = match token.kind {
            TokenKind::String => Literal::String(token.text.clone()),
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            TokenKind::Number => match token.text.parse::<f64>() {
                Ok(n) => Literal::Number(n),
                Err(_) => return Err(self.unexpected("number")),
            },
            TokenKind::LBracket => return Err(self.fail(ParseError::NestedList, &token)),
            _ => return Err(self.unexpected("value")),
        };
        self.advance();
        Ok(value)
    }

    /// Elements after an opening `[`
    fn parse_list(&mut self) -> PResult<Literal> {
        let mut items = Vec::new();
        if self.check(TokenKind::RBracket) {
            self.advance();
            return Ok(Literal::List(items));
        }
        loop {
            items.push(self.parse_scalar()?);
            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RBracket => {
                    self.advance();
                    return Ok(Literal::List(items));
                }
                _ => return Err(self.unexpected("',' or ']'")),
            }
        }
    }
}

/// Display-safe description of a token for messages
fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::String => format!("\"{}\"", display_safe(&token.text, MAX_QUOTED_TOKEN_CHARS)),
        _ => format!("'{}'", display_safe(&token.text, MAX_QUOTED_TOKEN_CHARS)),
    }
}
