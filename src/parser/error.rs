use crate::diagnostic::ValidationError;
use crate::lexer::token::Token;
use crate::pattern::PatternError;
use thiserror::Error;

/// Syntax and structural errors raised while parsing
///
/// Every variant is turned into a positioned [`ValidationError`]; none of
/// them escape the parser as `Err`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Rule text is empty or only whitespace and comments
    #[error("Rule expression is empty")]
    EmptyInput,

    /// A specific token or construct was required
    #[error("Expected {expected} but found {found}")]
    UnexpectedToken {
        /// What the grammar required
        expected: String,
        /// Display-safe description of the offending token
        found: String,
    },

    /// Tokens remain after a complete expression
    #[error("Unexpected token {found} after expression")]
    TrailingToken {
        /// Display-safe description of the offending token
        found: String,
    },

    /// Nesting limit exceeded
    #[error("Expression is too deeply nested (maximum depth is {limit})")]
    TooDeeplyNested {
        /// Configured maximum depth
        limit: usize,
    },

    /// Parse budget exhausted
    #[error("Rule parsing timed out after {limit_ms}ms")]
    Timeout {
        /// Configured budget in milliseconds
        limit_ms: u128,
    },

    /// `matches` pattern refused by the regex guard
    #[error("Invalid pattern for 'matches': {0}")]
    InvalidPattern(#[from] PatternError),

    /// Count compared with something other than a whole number or count
    #[error("Count must be compared with a whole number or trace.count(...) but found {found}")]
    InvalidCountOperand {
        /// Display-safe description of the offending token
        found: String,
    },

    /// Operator that has no meaning for counts
    #[error("Operator '{operator}' cannot be used with trace.count(...)")]
    InvalidCountOperator {
        /// Operator as written
        operator: String,
    },

    /// List literal outside of `in`
    #[error("List values can only be used with 'in', not '{operator}'")]
    ListNotAllowed {
        /// Operator as written
        operator: String,
    },

    /// `matches` / `contains` given a non-string operand
    #[error("Operator '{operator}' requires a string value")]
    StringRequired {
        /// Operator as written
        operator: String,
    },

    /// Nested list literal
    #[error("List elements must be strings, numbers or booleans")]
    NestedList,
}

impl ParseError {
    /// Whether parsing cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParseError::EmptyInput | ParseError::TooDeeplyNested { .. } | ParseError::Timeout { .. }
        )
    }

    fn suggestion(&self) -> Option<String> {
        let hint = match self {
            ParseError::EmptyInput => "Write a rule such as trace.has(payment.charge)",
            ParseError::UnexpectedToken { expected, .. } => return expected_hint(expected),
            ParseError::TrailingToken { .. } => "Join expressions with 'and' or 'or'",
            ParseError::TooDeeplyNested { .. } => "Split the rule into several smaller rules",
            ParseError::Timeout { .. } => "Simplify the rule expression",
            ParseError::InvalidPattern(_) => "Check the regular expression syntax",
            ParseError::InvalidCountOperand { .. } => {
                "Use a number like 5 or another count like trace.count(http.response)"
            }
            ParseError::InvalidCountOperator { .. } => "Use one of == != > >= < <=",
            ParseError::ListNotAllowed { .. } => "Use 'in' to test membership in a list",
            ParseError::StringRequired { .. } => "Wrap the value in double quotes",
            ParseError::NestedList => "Flatten the list",
        };
        Some(hint.to_string())
    }

    /// Convert into a diagnostic positioned on `token`
    pub fn at(self, token: &Token) -> ValidationError {
        let suggestion = self.suggestion();
        let diagnostic = if self.is_fatal() && !matches!(self, ParseError::TooDeeplyNested { .. }) {
            ValidationError::whole_input(self.to_string())
        } else {
            ValidationError::error(token.line, token.column, token.len, self.to_string())
        };
        match suggestion {
            Some(s) => diagnostic.with_suggestion(s),
            None => diagnostic,
        }
    }
}

fn expected_hint(expected: &str) -> Option<String> {
    let hint = match expected {
        "'trace'" => "Rules start with trace.has(...) or trace.count(...)",
        "'has' or 'count'" => "Use trace.has(name) or trace.count(name)",
        "operation name" => "Name the span operation, e.g. payment.charge",
        "attribute name" => "Name the span attribute, e.g. http.status_code",
        "comparison operator" => "Use one of == != > >= < <= in matches contains",
        "value" => "Use a quoted string, a number, true or false",
        "')'" => "Close the parenthesis",
        "'('" => "Add an opening parenthesis",
        _ => return None,
    };
    Some(hint.to_string())
}
