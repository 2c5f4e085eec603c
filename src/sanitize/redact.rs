//! Sensitive-data redaction for diagnostic text
//!
//! Rule text is attacker-controlled and is echoed back inside diagnostics, so
//! anything that looks like a credential or personal data is replaced with a
//! fixed `***REDACTED_<KIND>***` placeholder before it reaches a viewer.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Matches any placeholder produced by [`redact`]
pub static PLACEHOLDER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\*\*\*REDACTED_[A-Z_]+\*\*\*").ok());

/// How a matched secret is replaced
#[derive(Clone, Copy)]
enum Replacement {
    /// Replace the whole match
    Whole(&'static str),
    /// Keep the named key and separator, replace the value
    Value(&'static str),
    /// Replace only when the digits pass the Luhn check
    Card(&'static str),
}

struct RedactionRule {
    pattern: Regex,
    replacement: Replacement,
}

// Order matters: wider shapes (key blocks, URLs with credentials) must be
// consumed before the narrower patterns that would match inside them.
const RULES: &[(&str, Replacement)] = &[
    (
        r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----",
        Replacement::Whole("***REDACTED_PRIVATE_KEY***"),
    ),
    (
        r"[a-zA-Z][a-zA-Z0-9+.-]*://[^\s:/@]+:[^\s@]+@[^\s'\x22]+",
        Replacement::Whole("***REDACTED_CONNECTION_STRING***"),
    ),
    (
        r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+",
        Replacement::Whole("***REDACTED_JWT***"),
    ),
    (
        r"(?:sk|pk|rk)_(?:live|test)_[A-Za-z0-9]+",
        Replacement::Whole("***REDACTED_API_KEY***"),
    ),
    (
        r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
        Replacement::Whole("***REDACTED_AWS_KEY***"),
    ),
    (
        r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]{8,}",
        Replacement::Whole("***REDACTED_TOKEN***"),
    ),
    (
        r"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key)(\s*[=:]\s*)[^\s,;'\x22]+",
        Replacement::Value("***REDACTED_SECRET***"),
    ),
    (
        r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}",
        Replacement::Whole("***REDACTED_EMAIL***"),
    ),
    (
        r"\b(?:\d[ -]?){12,18}\d\b",
        Replacement::Card("***REDACTED_CARD***"),
    ),
    (
        r"\b\d{3}-\d{2}-\d{4}\b",
        Replacement::Whole("***REDACTED_SSN***"),
    ),
];

static COMPILED: Lazy<Vec<RedactionRule>> = Lazy::new(|| {
    RULES
        .iter()
        .filter_map(|&(pattern, replacement)| {
            Regex::new(pattern)
                .ok()
                .map(|pattern| RedactionRule { pattern, replacement })
        })
        .collect()
});

/// Replace recognisable secrets in `text` with placeholders
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for rule in COMPILED.iter() {
        if !rule.pattern.is_match(&out) {
            continue;
        }
        out = match rule.replacement {
            Replacement::Whole(placeholder) => rule.pattern.replace_all(&out, placeholder).into_owned(),
            Replacement::Value(placeholder) => rule
                .pattern
                .replace_all(&out, |caps: &Captures| format!("{}{}{}", &caps[1], &caps[2], placeholder))
                .into_owned(),
            Replacement::Card(placeholder) => rule
                .pattern
                .replace_all(&out, |caps: &Captures| {
                    if luhn_valid(&caps[0]) {
                        placeholder.to_string()
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned(),
        };
    }
    out
}

/// Whether [`redact`] would change `text`
pub fn contains_sensitive(text: &str) -> bool {
    redact(text) != text
}

fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
