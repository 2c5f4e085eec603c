//! Guarded regex compilation
//!
//! The `regex` crate already guarantees linear-time matching, so the checks
//! here bound compile cost and reject patterns that are almost always a
//! mistake in a rule (nested quantifiers, runaway grouping).

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Maximum regex pattern length in bytes
pub const MAX_REGEX_PATTERN_LENGTH: usize = 1000;

/// Maximum DFA size limit (2 MB)
const MAX_DFA_SIZE: usize = 2 * 1024 * 1024;

/// Maximum NFA size limit (10 MB)
const MAX_NFA_SIZE: usize = 10 * 1024 * 1024;

/// Maximum group nesting depth
const MAX_GROUP_DEPTH: usize = 10;

/// A quantified group whose body is itself quantified, e.g. `(a+)+` or `(.*)*`
static NESTED_QUANTIFIER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\([^()]*[+*][^()]*\)[+*{]").ok());

/// Reasons a `matches` pattern is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Pattern has no characters
    #[error("Regex pattern is empty")]
    Empty,

    /// Pattern longer than [`MAX_REGEX_PATTERN_LENGTH`]
    #[error("Regex pattern is {len} bytes long (max: {limit})")]
    TooLong {
        /// Pattern length in bytes
        len: usize,
        /// Maximum pattern length in bytes
        limit: usize,
    },

    /// Groups nested past the depth limit
    #[error("Regex pattern nests groups deeper than {limit} levels")]
    TooDeep {
        /// Maximum group nesting depth
        limit: usize,
    },

    /// A quantified group whose body is itself quantified
    #[error("Regex pattern contains a nested quantifier")]
    NestedQuantifier,

    /// Rejected by the regex compiler or its size limits
    #[error("Invalid regex pattern: {0}")]
    Invalid(String),
}

/// Validate and compile a regex pattern with size limits
pub fn safe_regex_compile(pattern: &str) -> Result<Regex, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }
    if pattern.len() > MAX_REGEX_PATTERN_LENGTH {
        return Err(PatternError::TooLong {
            len: pattern.len(),
            limit: MAX_REGEX_PATTERN_LENGTH,
        });
    }
    if group_depth(pattern) > MAX_GROUP_DEPTH {
        return Err(PatternError::TooDeep {
            limit: MAX_GROUP_DEPTH,
        });
    }
    if let Some(nested) = NESTED_QUANTIFIER.as_ref() {
        if nested.is_match(pattern) {
            return Err(PatternError::NestedQuantifier);
        }
    }

    RegexBuilder::new(pattern)
        .dfa_size_limit(MAX_DFA_SIZE)
        .size_limit(MAX_NFA_SIZE)
        .build()
        .map_err(|e| PatternError::Invalid(first_line(&e.to_string())))
}

/// Deepest unescaped group nesting
fn group_depth(pattern: &str) -> usize {
    let mut depth: usize = 0;
    let mut max_depth = 0;
    let mut escaped = false;

    for ch in pattern.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '(' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max_depth
}

// regex errors render a multi-line excerpt; diagnostics carry their own
fn first_line(message: &str) -> String {
    message
        .lines()
        .rev()
        .find(|l| l.starts_with("error:"))
        .unwrap_or_else(|| message.lines().next().unwrap_or(message))
        .trim_start_matches("error:")
        .trim()
        .to_string()
}
