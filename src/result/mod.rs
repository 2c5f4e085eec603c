//! Violations and where they are delivered

use crate::eval::Evaluation;
use crate::ruleset::{CompiledRule, RuleSeverity};
use crate::trace::Trace;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// A rule violated by a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Id of the violated rule
    pub rule_id: String,
    /// Name of the violated rule
    pub rule_name: String,
    /// Rule severity
    pub severity: RuleSeverity,
    /// Trace that violated the rule
    pub trace_id: String,
    /// Spans that contributed to the violation
    pub span_ids: Vec<String>,
    /// Rule description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Violation {
    /// Build a violation from a rule and its evaluation
    pub fn new(rule: &CompiledRule, trace: &Trace, evaluation: &Evaluation) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            trace_id: trace.trace_id.clone(),
            span_ids: evaluation.span_ids(trace),
            description: rule.description.clone(),
        }
    }
}

/// Receives violations found by the engine
///
/// The signal/notification service sits behind this trait.
pub trait ViolationSink: Send + Sync {
    /// Deliver one batch of violations for a trace
    fn publish(&self, violations: &[Violation]);
}

/// Keeps every violation in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    violations: Mutex<Vec<Violation>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Violations received so far
    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    /// Drain the received violations
    pub fn take(&self) -> Vec<Violation> {
        std::mem::take(&mut *self.violations.lock())
    }

    /// Number of violations received
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Whether nothing has been received
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }
}

impl ViolationSink for CollectingSink {
    fn publish(&self, violations: &[Violation]) {
        self.violations.lock().extend_from_slice(violations);
    }
}

/// Emits each violation as a structured `warn!` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ViolationSink for TracingSink {
    fn publish(&self, violations: &[Violation]) {
        for v in violations {
            warn!(
                rule_id = %v.rule_id,
                rule_name = %v.rule_name,
                severity = %v.severity,
                trace_id = %v.trace_id,
                spans = v.span_ids.len(),
                "trace violated rule"
            );
        }
    }
}
