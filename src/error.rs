//! Crate-level error type

use crate::diagnostic::ValidationError;
use thiserror::Error;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the rule engine, rule loading and configuration
///
/// DSL syntax problems are not represented here directly: they are collected
/// as [`ValidationError`] diagnostics and only wrapped in
/// [`EngineError::Compilation`] when a caller asked for a compiled rule.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A rule failed to compile
    #[error("rule '{rule_id}' failed to compile with {} error(s)", errors.len())]
    Compilation {
        /// Id of the rejected rule
        rule_id: String,
        /// Positioned diagnostics
        errors: Vec<ValidationError>,
    },

    /// A trace exceeded an evaluation resource limit
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Rule id not present in the rule set
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// Filesystem error while loading rules or configuration
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A rule file could not be deserialized
    #[error("invalid rule file {path}: {message}")]
    RuleFile {
        /// Path of the rule file
        path: String,
        /// Deserializer message
        message: String,
    },

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Worker pool could not be created
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl EngineError {
    /// Diagnostics attached to a compilation failure, if any
    pub fn diagnostics(&self) -> &[ValidationError] {
        match self {
            EngineError::Compilation { errors, .. } => errors,
            _ => &[],
        }
    }
}
