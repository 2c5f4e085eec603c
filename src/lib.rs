//! Trace invariant rules for distributed tracing
//!
//! This library compiles a small DSL describing properties a trace must or
//! must not have, and evaluates compiled rules against incoming traces.
//!
//! # Example
//!
//! ```
//! use spanrules::{parse_rule, evaluate, Span, SpanStatus, Trace};
//!
//! let result = parse_rule(r#"trace.has(payment.charge).where(amount > 1000) and not trace.has(fraud.check)"#);
//! assert!(result.valid);
//!
//! let trace = Trace::new(
//!     "t1",
//!     vec![Span::new("payment.charge")
//!         .with_attribute("amount", 2500i64)
//!         .with_status(SpanStatus::Ok)],
//! );
//! let ast = result.ast.unwrap();
//! assert!(evaluate(&ast, &trace).violated);
//! ```
//!
//! # Rule Engine
//!
//! ```no_run
//! use spanrules::{EngineBuilder, TracingSink, Trace};
//!
//! # fn example() -> anyhow::Result<()> {
//! let engine = EngineBuilder::new()
//!     .add_rule_dir("/path/to/rules")
//!     .worker_threads(4)
//!     .build()?;
//!
//! let trace: Trace = serde_json::from_str(r#"{"traceId": "t1", "spans": []}"#)?;
//! engine.evaluate_and_publish(&trace, &TracingSink)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

// Re-export commonly used items
pub use ast::{Comparator, Literal, LogicalOp, RuleExpression, WhereClause};
pub use config::{EngineConfig, Limits};
pub use diagnostic::{ParseResult, Severity, ValidationError};
pub use engine::{EngineBuilder, RuleEngine};
pub use error::{EngineError, Result};
pub use eval::{evaluate, Evaluation, Evaluator};
pub use lexer::tokenize;
pub use parser::{parse_rule, parse_rule_with_limits};
pub use result::{CollectingSink, TracingSink, Violation, ViolationSink};
pub use ruleset::{CompiledRule, RuleDefinition, RuleSet, RuleSeverity};
pub use sanitize::{DiagnosticRenderer, OutputContext};
pub use trace::{AttributeValue, Span, SpanStatus, Trace};

/// Rule model
pub mod ast;

/// Limits and configuration
pub mod config;

/// Positioned diagnostics
pub mod diagnostic;

/// Core engine implementation
pub mod engine;

/// Error types
pub mod error;

/// Rule evaluation
pub mod eval;

/// Lexical analysis
pub mod lexer;

/// Parser implementation
pub mod parser;

/// Guarded regex compilation
pub mod pattern;

/// Violations and sinks
pub mod result;

/// Compiled rules and the rule store
pub mod ruleset;

/// Output sanitization for diagnostics
pub mod sanitize;

/// Trace and span model
pub mod trace;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber with default settings
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
