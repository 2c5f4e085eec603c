//! Trace-level rule evaluation
//!
//! A rule expression evaluated against a trace yields the violation flag:
//! `true` means the trace violates the invariant. Alongside the flag the
//! evaluator reports which spans made the true sub-expressions true.
//!
//! Evaluation is pure and total. Both operands of `and`/`or` are always
//! evaluated; type mismatches make a clause false instead of failing.

pub mod compare;

pub use compare::{compare, FLOAT_TOLERANCE};

use crate::ast::{AttributeTest, CountOperand, LogicalOp, RuleExpression, WhereClause};
use crate::trace::{Span, Trace};
use std::collections::{BTreeSet, HashMap};

/// Outcome of evaluating one expression against one trace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    /// The trace violates the rule
    pub violated: bool,
    /// Indices into `trace.spans` of the contributing spans, ascending
    pub matched_spans: Vec<usize>,
}

impl Evaluation {
    /// Ids of the contributing spans
    pub fn span_ids(&self, trace: &Trace) -> Vec<String> {
        self.matched_spans
            .iter()
            .filter_map(|&i| trace.spans.get(i))
            .map(|s| s.span_id.clone())
            .collect()
    }
}

/// Evaluates expressions against one trace
///
/// Spans are indexed by operation name once, so evaluating many rules
/// against the same trace only scans it once.
#[derive(Debug)]
pub struct Evaluator<'t> {
    trace: &'t Trace,
    by_name: HashMap<&'t str, Vec<usize>>,
}

impl<'t> Evaluator<'t> {
    /// Index `trace` for evaluation
    pub fn new(trace: &'t Trace) -> Self {
        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, span) in trace.spans.iter().enumerate() {
            by_name.entry(span.operation_name.as_str()).or_default().push(i);
        }
        Self { trace, by_name }
    }

    /// The trace being evaluated
    pub fn trace(&self) -> &'t Trace {
        self.trace
    }

    /// Evaluate `expr`
    pub fn evaluate(&self, expr: &RuleExpression) -> Evaluation {
        let (violated, spans) = self.eval(expr);
        Evaluation {
            violated,
            matched_spans: spans.into_iter().collect(),
        }
    }

    fn named(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn eval(&self, expr: &RuleExpression) -> (bool, BTreeSet<usize>) {
        match expr {
            RuleExpression::Binary {
                operator,
                left,
                right,
            } => {
                let (l, l_spans) = self.eval(left);
                let (r, r_spans) = self.eval(right);
                let holds = match operator {
                    LogicalOp::And => l && r,
                    LogicalOp::Or => l || r,
                };
                let mut spans = BTreeSet::new();
                if holds {
                    if l {
                        spans.extend(l_spans);
                    }
                    if r {
                        spans.extend(r_spans);
                    }
                }
                (holds, spans)
            }
            RuleExpression::Not { inner } => {
                let (holds, _) = self.eval(inner);
                (!holds, BTreeSet::new())
            }
            RuleExpression::Has {
                span_name,
                where_clauses,
            } => {
                let spans: BTreeSet<usize> = self
                    .named(span_name)
                    .iter()
                    .copied()
                    .filter(|&i| {
                        let span = &self.trace.spans[i];
                        where_clauses.iter().all(|c| clause_holds(c, span))
                    })
                    .collect();
                (!spans.is_empty(), spans)
            }
            RuleExpression::Count {
                span_name,
                operator,
                operand,
            } => {
                let counted = self.named(span_name);
                let (right, other) = match operand {
                    CountOperand::Literal { value } => {
                        (usize::try_from(*value).unwrap_or(usize::MAX), &[][..])
                    }
                    CountOperand::Count { span_name } => {
                        let other = self.named(span_name);
                        (other.len(), other)
                    }
                };
                let holds = operator.compare_counts(counted.len(), right);
                let spans = if holds {
                    counted.iter().chain(other).copied().collect()
                } else {
                    BTreeSet::new()
                };
                (holds, spans)
            }
        }
    }
}

/// Whether one where clause holds for `span`
pub fn clause_holds(clause: &WhereClause, span: &Span) -> bool {
    let value = span.attribute(&clause.attribute);
    let holds = match (&clause.test, value) {
        (AttributeTest::Truthy, Some(v)) => v.is_truthy(),
        (AttributeTest::Compare { operator, value: expected }, Some(v)) => {
            compare(&v, *operator, expected)
        }
        (_, None) => false,
    };
    holds != clause.negated
}

/// Evaluate `expr` against `trace` in one call
pub fn evaluate(expr: &RuleExpression, trace: &Trace) -> Evaluation {
    Evaluator::new(trace).evaluate(expr)
}
