//! Pattern handling for `matches` where clauses
//!
//! Regex literals come from untrusted rule text, so they are only ever
//! compiled through [`security::safe_regex_compile`].

pub mod security;

pub use security::{safe_regex_compile, PatternError};
