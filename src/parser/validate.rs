//! Semantic lint checks run while parsing
//!
//! These never make a rule invalid; they flag constructs that compile but
//! are usually a mistake or an expensive habit.

use crate::ast::{Comparator, Literal};
use crate::diagnostic::ValidationError;
use crate::lexer::token::Token;

/// Count thresholds above this are flagged
pub const HIGH_COUNT_THRESHOLD: u64 = 1000;

/// Operation names should follow `service.operation`
pub fn check_span_name(name: &str, token: &Token, len: usize) -> Option<ValidationError> {
    if name.contains('.') {
        return None;
    }
    Some(
        ValidationError::info(
            token.line,
            token.column,
            len,
            format!("Operation name '{}' doesn't follow the 'service.operation' convention", name),
        )
        .with_suggestion("Use names like 'payment.charge_card' or 'database.query'"),
    )
}

/// `or` chains may raise one violation per alternative
pub fn check_or(token: &Token) -> ValidationError {
    ValidationError::info(
        token.line,
        token.column,
        token.len,
        "OR expressions may create multiple signals",
    )
    .with_suggestion("Consider splitting the alternatives into separate rules")
}

/// Counts compared with a literal
pub fn check_count(operator: Comparator, value: u64, token: &Token) -> Vec<ValidationError> {
    let mut out = Vec::new();
    if value > HIGH_COUNT_THRESHOLD {
        out.push(ValidationError::warning(
            token.line,
            token.column,
            token.len,
            format!(
                "Counting more than {} spans may impact performance",
                HIGH_COUNT_THRESHOLD
            ),
        ));
    }
    if operator == Comparator::Eq {
        out.push(
            ValidationError::info(
                token.line,
                token.column,
                token.len,
                "Exact count matching (==) is fragile",
            )
            .with_suggestion("Consider a range such as >= or <="),
        );
    }
    out
}

/// Exact equality on monetary amounts
pub fn check_where(
    attribute: &str,
    operator: Comparator,
    value: &Literal,
    token: &Token,
    len: usize,
) -> Option<ValidationError> {
    let last = attribute.rsplit('.').next().unwrap_or(attribute);
    if last != "amount" || operator != Comparator::Eq || !matches!(value, Literal::Number(_)) {
        return None;
    }
    Some(
        ValidationError::info(
            token.line,
            token.column,
            len,
            "Exact amount comparison (==) is fragile",
        )
        .with_suggestion("Consider a range using > and < instead"),
    )
}
