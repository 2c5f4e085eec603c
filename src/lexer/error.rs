use crate::diagnostic::ValidationError;
use thiserror::Error;

/// Errors that can occur during lexing
///
/// None of these abort the scan except [`LexError::InputTooLarge`] and
/// [`LexError::Timeout`]; the rest are recorded and the lexer resynchronises.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// Input ended inside a string literal
    #[error("Unterminated string literal")]
    UnterminatedString,

    /// Identifier longer than the configured limit
    #[error("Identifier exceeds maximum length of {limit} characters")]
    IdentifierTooLong {
        /// Maximum identifier length in characters
        limit: usize,
    },

    /// String literal longer than the configured limit
    #[error("String literal exceeds maximum length of {limit} characters")]
    StringTooLong {
        /// Maximum string length in characters
        limit: usize,
    },

    /// Character outside the DSL alphabet
    #[error("Unexpected character '{ch}' in '{context}'")]
    UnexpectedCharacter {
        /// Display-safe form of the character
        ch: String,
        /// Display-safe, redacted word the character appears in
        context: String,
    },

    /// Input larger than the configured limit
    #[error("Rule text is {len} bytes, exceeding the maximum of {limit} bytes")]
    InputTooLarge {
        /// Input size in bytes
        len: usize,
        /// Maximum input size in bytes
        limit: usize,
    },

    /// Scan budget exhausted
    #[error("Rule parsing timed out after {limit_ms}ms")]
    Timeout {
        /// Configured budget in milliseconds
        limit_ms: u128,
    },
}

impl LexError {
    /// Whether lexing cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, LexError::InputTooLarge { .. } | LexError::Timeout { .. })
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            LexError::UnterminatedString => Some("Close the string with a matching '\"'"),
            LexError::IdentifierTooLong { .. } => Some("Use a shorter span or attribute name"),
            LexError::StringTooLong { .. } => Some("Shorten the string value"),
            LexError::UnexpectedCharacter { .. } => {
                Some("Remove the character or wrap the value in double quotes")
            }
            LexError::InputTooLarge { .. } => Some("Split the rule into several smaller rules"),
            LexError::Timeout { .. } => Some("Simplify the rule expression"),
        }
    }

    /// Convert into a positioned diagnostic
    ///
    /// Fatal errors are whole-input failures and are always reported at (1,1).
    pub fn into_diagnostic(self, line: usize, column: usize, len: usize) -> ValidationError {
        let suggestion = self.suggestion();
        let diagnostic = if self.is_fatal() {
            ValidationError::whole_input(self.to_string())
        } else {
            ValidationError::error(line, column, len, self.to_string())
        };
        match suggestion {
            Some(s) => diagnostic.with_suggestion(s),
            None => diagnostic,
        }
    }
}
