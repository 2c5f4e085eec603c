//! Typed comparison of span attributes against rule literals
//!
//! Mismatched types never raise: a comparison that cannot be made simply
//! does not hold, for `!=` as well as for `==`.

use crate::ast::{Comparator, Literal};
use crate::trace::AttributeValue;

/// Tolerance for float equality
pub const FLOAT_TOLERANCE: f64 = 1e-4;

/// Whether `actual <operator> expected` holds
pub fn compare(actual: &AttributeValue, operator: Comparator, expected: &Literal) -> bool {
    match operator {
        Comparator::Eq => equals(actual, expected) == Some(true),
        Comparator::NotEq => equals(actual, expected) == Some(false),
        Comparator::Gt => ordering(actual, expected, |a, b| a > b),
        Comparator::Gte => ordering(actual, expected, |a, b| a >= b || float_eq(a, b)),
        Comparator::Lt => ordering(actual, expected, |a, b| a < b),
        Comparator::Lte => ordering(actual, expected, |a, b| a <= b || float_eq(a, b)),
        Comparator::In => member_of(actual, expected),
        Comparator::Matches => matches_pattern(actual, expected),
        Comparator::Contains => contains(actual, expected),
    }
}

fn float_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < FLOAT_TOLERANCE
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Numeric view of an attribute; numeric strings coerce
fn attribute_number(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::String(s) => parse_number(s),
        other => other.as_f64(),
    }
}

fn literal_number(value: &Literal) -> Option<f64> {
    match value {
        Literal::Number(n) => Some(*n),
        Literal::String(s) => parse_number(s),
        _ => None,
    }
}

fn ordering(actual: &AttributeValue, expected: &Literal, op: impl Fn(f64, f64) -> bool) -> bool {
    match (attribute_number(actual), literal_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Typed equality; `None` when the two sides cannot be compared
fn equals(actual: &AttributeValue, expected: &Literal) -> Option<bool> {
    match (actual, expected) {
        (AttributeValue::String(a), Literal::String(b)) => Some(&**a == b.as_str()),
        (AttributeValue::String(a), Literal::Number(n)) => parse_number(a).map(|a| float_eq(a, *n)),
        (AttributeValue::String(a), Literal::Bool(b)) => {
            let a = a.trim();
            if a.eq_ignore_ascii_case("true") {
                Some(*b)
            } else if a.eq_ignore_ascii_case("false") {
                Some(!*b)
            } else {
                None
            }
        }
        (AttributeValue::Integer(_) | AttributeValue::Float(_), Literal::Number(n)) => {
            actual.as_f64().map(|a| float_eq(a, *n))
        }
        (AttributeValue::Integer(_) | AttributeValue::Float(_), Literal::String(s)) => {
            match (actual.as_f64(), parse_number(s)) {
                (Some(a), Some(b)) => Some(float_eq(a, b)),
                _ => Some(actual.to_text() == s.as_str()),
            }
        }
        (AttributeValue::Boolean(a), Literal::Bool(b)) => Some(a == b),
        (AttributeValue::Boolean(a), Literal::String(s)) => {
            Some(s.trim().eq_ignore_ascii_case(if *a { "true" } else { "false" }))
        }
        _ => None,
    }
}

fn member_of(actual: &AttributeValue, expected: &Literal) -> bool {
    match (actual, expected) {
        (_, Literal::List(items)) => items.iter().any(|item| equals(actual, item) == Some(true)),
        (AttributeValue::Array(elements), scalar) => {
            elements.iter().any(|e| equals(e, scalar) == Some(true))
        }
        (_, scalar) => equals(actual, scalar) == Some(true),
    }
}

fn matches_pattern(actual: &AttributeValue, expected: &Literal) -> bool {
    let Literal::Pattern(pattern) = expected else {
        return false;
    };
    match actual {
        AttributeValue::Null => false,
        AttributeValue::Array(elements) => elements.iter().any(|e| matches_pattern(e, expected)),
        other => pattern.regex().is_match(&other.to_text()),
    }
}

fn contains(actual: &AttributeValue, expected: &Literal) -> bool {
    let Literal::String(needle) = expected else {
        return false;
    };
    match actual {
        AttributeValue::Null => false,
        AttributeValue::Array(elements) => elements
            .iter()
            .any(|e| equals(e, expected) == Some(true)),
        other => other.to_text().contains(needle.as_str()),
    }
}
