//! Rule engine: compiles DSL rules and evaluates traces against them

use crate::config::{EngineConfig, Limits};
use crate::diagnostic::{ParseResult, ValidationError};
use crate::error::{EngineError, Result};
use crate::eval::Evaluator;
use crate::parser::parse_rule_with_limits;
use crate::result::{Violation, ViolationSink};
use crate::ruleset::{CompiledRule, LoadReport, RuleDefinition, RuleSet};
use crate::trace::Trace;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builder for configuring the rule engine
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    /// Rule directories to scan
    pub rule_dirs: Vec<String>,
    /// Whether to fail on rule parse errors
    pub fail_on_parse_error: bool,
    /// Number of worker threads
    pub worker_threads: usize,
    /// Compile and evaluation limits
    pub limits: Limits,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::from_config(EngineConfig::default())
    }
}

impl EngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            rule_dirs: config.rule_dirs,
            fail_on_parse_error: config.fail_on_parse_error,
            worker_threads: config.worker_threads,
            limits: config.limits,
        }
    }

    /// Add a rule directory
    pub fn add_rule_dir(mut self, dir: impl Into<String>) -> Self {
        self.rule_dirs.push(dir.into());
        self
    }

    /// Set whether to fail on parse errors
    pub fn fail_on_parse_error(mut self, fail: bool) -> Self {
        self.fail_on_parse_error = fail;
        self
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Replace the limits
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Build the engine, loading every configured rule directory
    pub fn build(self) -> Result<RuleEngine> {
        RuleEngine::new(self)
    }
}

/// Holds compiled rules and evaluates traces against them
///
/// Rules live in a [`RuleSet`] shared behind an `Arc`; evaluation takes a
/// snapshot of the enabled rules, so concurrent edits never affect a trace
/// that is already being evaluated.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Arc<RuleSet>,
    limits: Limits,
    pool: rayon::ThreadPool,
}

impl RuleEngine {
    /// Create an engine from a builder configuration
    pub fn new(builder: EngineBuilder) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(builder.worker_threads)
            .thread_name(|i| format!("spanrules-eval-{}", i))
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;

        let engine = Self {
            rules: Arc::new(RuleSet::new()),
            limits: builder.limits,
            pool,
        };

        for dir in &builder.rule_dirs {
            match engine.load_dir(dir, builder.fail_on_parse_error) {
                Ok(_) => {}
                Err(e) if builder.fail_on_parse_error => return Err(e),
                Err(e) => warn!(dir = %dir, error = %e, "failed to load rules"),
            }
        }

        info!(
            rules = engine.rules.len(),
            workers = engine.pool.current_num_threads(),
            "rule engine ready"
        );
        Ok(engine)
    }

    /// The rule store
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Shared handle to the rule store
    pub fn rules_handle(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules)
    }

    /// Limits applied to compiles and evaluations
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Parse `dsl` and return every diagnostic, valid or not
    pub fn check(&self, dsl: &str) -> ParseResult {
        parse_rule_with_limits(dsl, &self.limits)
    }

    /// Compile bare DSL text into a rule with a generated id
    ///
    /// The rule is not stored; use [`RuleEngine::add_rule`] for that.
    pub fn compile(&self, dsl: &str) -> std::result::Result<CompiledRule, Vec<ValidationError>> {
        let id = uuid::Uuid::new_v4().to_string();
        let definition = RuleDefinition::new(id.clone(), dsl).with_id(id);
        CompiledRule::compile(definition, &self.limits).map_err(|e| match e {
            EngineError::Compilation { errors, .. } => errors,
            other => vec![ValidationError::whole_input(other.to_string())],
        })
    }

    /// Compile a definition and store it, replacing any rule with the same id
    pub fn add_rule(&self, definition: RuleDefinition) -> Result<Arc<CompiledRule>> {
        let rule = CompiledRule::compile(definition, &self.limits)?;
        let id = rule.id.clone();
        self.rules.upsert(rule);
        self.rules
            .get(&id)
            .ok_or(EngineError::RuleNotFound(id))
    }

    /// Remove a stored rule
    pub fn remove_rule(&self, id: &str) -> Result<Arc<CompiledRule>> {
        self.rules.remove(id)
    }

    /// Enable or disable a stored rule
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.rules.set_enabled(id, enabled)
    }

    /// Load a rule directory into the store
    pub fn load_dir(&self, dir: impl AsRef<Path>, fail_fast: bool) -> Result<LoadReport> {
        self.rules.load_dir(dir, &self.limits, fail_fast)
    }

    fn check_resources(&self, trace: &Trace) -> Result<()> {
        if trace.spans.len() > self.limits.max_spans_per_trace {
            warn!(
                trace_id = %trace.trace_id,
                spans = trace.spans.len(),
                limit = self.limits.max_spans_per_trace,
                "trace rejected"
            );
            return Err(EngineError::ResourceLimit(format!(
                "trace has {} spans, limit is {}",
                trace.spans.len(),
                self.limits.max_spans_per_trace
            )));
        }

        if let Some(span) = trace
            .spans
            .iter()
            .find(|s| s.attributes.len() > self.limits.max_attributes_per_span)
        {
            warn!(
                trace_id = %trace.trace_id,
                span_id = %span.span_id,
                attributes = span.attributes.len(),
                limit = self.limits.max_attributes_per_span,
                "trace rejected"
            );
            return Err(EngineError::ResourceLimit(format!(
                "span '{}' has {} attributes, limit is {}",
                span.span_id,
                span.attributes.len(),
                self.limits.max_attributes_per_span
            )));
        }
        Ok(())
    }

    /// Evaluate every enabled rule against `trace`
    ///
    /// Violations are ordered by rule id.
    pub fn evaluate_trace(&self, trace: &Trace) -> Result<Vec<Violation>> {
        self.check_resources(trace)?;

        let foreign = trace.foreign_spans().count();
        if foreign > 0 {
            debug!(trace_id = %trace.trace_id, foreign, "trace contains spans of other traces");
        }

        let rules = self.rules.enabled_rules();
        let evaluator = Evaluator::new(trace);
        let mut violations: Vec<Violation> = self.pool.install(|| {
            rules
                .par_iter()
                .filter_map(|rule| {
                    let evaluation = evaluator.evaluate(&rule.ast);
                    evaluation
                        .violated
                        .then(|| Violation::new(rule, trace, &evaluation))
                })
                .collect()
        });
        violations.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        debug!(
            trace_id = %trace.trace_id,
            rules = rules.len(),
            violations = violations.len(),
            "evaluated trace"
        );
        Ok(violations)
    }

    /// Evaluate `trace` and hand any violations to `sink`
    ///
    /// Returns the number of violations published.
    pub fn evaluate_and_publish(&self, trace: &Trace, sink: &dyn ViolationSink) -> Result<usize> {
        let violations = self.evaluate_trace(trace)?;
        if !violations.is_empty() {
            sink.publish(&violations);
        }
        Ok(violations.len())
    }
}
