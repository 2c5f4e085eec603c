//! Resource limits and engine configuration
//!
//! Every compile call gets its own [`Deadline`]; there is no process-wide
//! parse state, so concurrent compiles never interfere with each other.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::{Duration, Instant};

/// Maximum size of a rule's DSL text in bytes
pub const MAX_TOTAL_DSL_LENGTH: usize = 65_536;

/// Maximum identifier length in characters
pub const MAX_IDENTIFIER_LENGTH: usize = 100;

/// Maximum string literal length in characters
pub const MAX_STRING_LENGTH: usize = 10_000;

/// Maximum grammar nesting depth
pub const MAX_RECURSION_DEPTH: usize = 100;

/// Wall-clock budget for lexing and parsing one rule
pub const MAX_PARSE_TIME_MS: u64 = 100;

/// Maximum spans evaluated in one trace
pub const MAX_SPANS_PER_TRACE: usize = 100_000;

/// Maximum attributes on a single span
pub const MAX_ATTRIBUTES_PER_SPAN: usize = 10_000;

/// Maximum length of a rendered diagnostic message
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Resource limits applied while compiling and evaluating rules
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum DSL input size in bytes
    pub max_total_length: usize,
    /// Maximum identifier length in characters
    pub max_identifier_length: usize,
    /// Maximum string literal length in characters
    pub max_string_length: usize,
    /// Maximum parser nesting depth
    pub max_recursion_depth: usize,
    /// Wall-clock budget for one compile
    #[serde(rename = "max_parse_time_ms", deserialize_with = "duration_from_millis")]
    pub max_parse_time: Duration,
    /// Maximum spans in one evaluated trace
    pub max_spans_per_trace: usize,
    /// Maximum attributes per span
    pub max_attributes_per_span: usize,
    /// Maximum rendered diagnostic length in characters
    pub max_message_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_total_length: MAX_TOTAL_DSL_LENGTH,
            max_identifier_length: MAX_IDENTIFIER_LENGTH,
            max_string_length: MAX_STRING_LENGTH,
            max_recursion_depth: MAX_RECURSION_DEPTH,
            max_parse_time: Duration::from_millis(MAX_PARSE_TIME_MS),
            max_spans_per_trace: MAX_SPANS_PER_TRACE,
            max_attributes_per_span: MAX_ATTRIBUTES_PER_SPAN,
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }
}

fn duration_from_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Wall-clock budget for a single compile call
///
/// Checked cooperatively by the lexer on every iteration and by the parser on
/// every production entry.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a new deadline with the given budget
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Whether the budget has been used up
    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    /// The configured budget
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Engine configuration, loadable from YAML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories scanned for `*.yml` / `*.yaml` rule definitions
    pub rule_dirs: Vec<String>,
    /// Abort loading on the first rule that fails to compile
    pub fail_on_parse_error: bool,
    /// Worker threads used for trace evaluation
    pub worker_threads: usize,
    /// Compile and evaluation limits
    pub limits: Limits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rule_dirs: vec![],
            fail_on_parse_error: false,
            worker_threads: num_cpus::get(),
            limits: Limits::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from YAML bytes
    pub fn from_yaml(data: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(data).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&data)
    }
}
