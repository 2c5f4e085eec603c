//! Positioned diagnostics shared by the lexer, the parser and the editor surface
//!
//! The serialized shape of [`ValidationError`] and [`ParseResult`] is consumed
//! by editors for inline squiggles, so field names are stable camelCase.

use crate::ast::RuleExpression;
use serde::Serialize;
use std::fmt;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Makes the rule invalid
    Error,
    /// Likely mistake, rule still compiles
    Warning,
    /// Style or convention hint
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(label)
    }
}

/// A diagnostic anchored to a source range
///
/// Lines and columns are 1-based. `end_column` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Start line
    pub line: usize,
    /// Start column
    pub column: usize,
    /// End line
    pub end_line: usize,
    /// End column (exclusive)
    pub end_column: usize,
    /// Human readable message
    pub message: String,
    /// Diagnostic severity
    pub severity: Severity,
    /// Optional fix hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationError {
    /// Create an error spanning `len` bytes starting at `line:column`
    pub fn error(line: usize, column: usize, len: usize, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, line, column, len, message)
    }

    /// Create a warning spanning `len` bytes starting at `line:column`
    pub fn warning(line: usize, column: usize, len: usize, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, line, column, len, message)
    }

    /// Create an informational hint spanning `len` bytes starting at `line:column`
    pub fn info(line: usize, column: usize, len: usize, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, line, column, len, message)
    }

    /// Whole-input failure reported at (1,1)
    pub fn whole_input(message: impl Into<String>) -> Self {
        Self::error(1, 1, 1, message)
    }

    fn with_severity(
        severity: Severity,
        line: usize,
        column: usize,
        len: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            column,
            end_line: line,
            end_column: column + len.max(1),
            message: message.into(),
            severity,
            suggestion: None,
        }
    }

    /// Attach a fix hint
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Whether this diagnostic invalidates the rule
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Format the diagnostic with the offending source line and a caret
    ///
    /// ```text
    /// error at line 1, column 11: Expected operation name but found ')'
    ///   trace.has()
    ///             ^
    ///   suggestion: ...
    /// ```
    pub fn format_with_source(&self, source: &str) -> String {
        let mut out = format!(
            "{} at line {}, column {}: {}",
            self.severity, self.line, self.column, self.message
        );
        if let Some(text) = source.lines().nth(self.line.saturating_sub(1)) {
            let width = self.end_column.saturating_sub(self.column).max(1);
            let remaining = text.chars().count().saturating_sub(self.column.saturating_sub(1));
            let width = width.min(remaining.max(1));
            out.push_str("\n  ");
            out.push_str(text);
            out.push_str("\n  ");
            out.push_str(&" ".repeat(self.column.saturating_sub(1)));
            out.push_str(&"^".repeat(width));
        }
        if let Some(suggestion) = &self.suggestion {
            out.push_str("\n  suggestion: ");
            out.push_str(suggestion);
        }
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.line, self.column, self.severity, self.message
        )
    }
}

/// Outcome of compiling DSL text
///
/// `valid` is true iff `errors` is empty. `ast` may be present even when the
/// result is invalid: a trailing-token error keeps the parsed prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    /// No errors were reported
    pub valid: bool,
    /// Error diagnostics in source order of discovery
    pub errors: Vec<ValidationError>,
    /// Warning and info diagnostics
    pub warnings: Vec<ValidationError>,
    /// Parsed expression, when the top-level parse completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<RuleExpression>,
}

impl ParseResult {
    /// Build a result, splitting diagnostics by severity
    pub fn new(diagnostics: Vec<ValidationError>, ast: Option<RuleExpression>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            diagnostics.into_iter().partition(ValidationError::is_error);
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
            ast,
        }
    }

    /// A result carrying a single whole-input error
    pub fn failed(error: ValidationError) -> Self {
        Self::new(vec![error], None)
    }

    /// All diagnostics, errors first
    pub fn diagnostics(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().chain(self.warnings.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_column_from_length() {
        let err = ValidationError::error(2, 5, 3, "bad");
        assert_eq!(err.end_line, 2);
        assert_eq!(err.end_column, 8);

        // zero-length (end of input) still covers one column
        let err = ValidationError::error(1, 10, 0, "eof");
        assert_eq!(err.end_column, 11);
    }

    #[test]
    fn test_parse_result_partition() {
        let result = ParseResult::new(
            vec![
                ValidationError::warning(1, 1, 1, "w"),
                ValidationError::error(1, 2, 1, "e"),
                ValidationError::info(1, 3, 1, "i"),
            ],
            None,
        );
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_format_with_source() {
        let err = ValidationError::error(1, 11, 1, "Expected operation name but found ')'")
            .with_suggestion("Name the span operation");
        let formatted = err.format_with_source("trace.has()");
        let lines: Vec<_> = formatted.lines().collect();
        assert_eq!(lines[0], "error at line 1, column 11: Expected operation name but found ')'");
        assert_eq!(lines[1], "  trace.has()");
        assert_eq!(lines[2], "            ^");
        assert_eq!(lines[3], "  suggestion: Name the span operation");
    }

    #[test]
    fn test_serialized_shape() {
        let err = ValidationError::error(3, 4, 2, "oops");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "line": 3,
                "column": 4,
                "endLine": 3,
                "endColumn": 6,
                "message": "oops",
                "severity": "error"
            })
        );
    }
}
