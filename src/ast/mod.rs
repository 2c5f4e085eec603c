//! Rule expression tree
//!
//! Produced by the parser and shared read-only by every evaluation. `Display`
//! renders canonical DSL text that parses back to an equal tree.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Boolean combinator joining two expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    /// Both sides hold
    And,
    /// Either side holds
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        })
    }
}

/// Comparison operator in where clauses and count checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Comparator {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    NotEq,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Gte,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Lte,
    /// Membership in a list, or element of an array attribute
    #[serde(rename = "in")]
    In,
    /// Regex match against the attribute's string form
    #[serde(rename = "matches")]
    Matches,
    /// Substring match
    #[serde(rename = "contains")]
    Contains,
}

impl Comparator {
    /// DSL spelling of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::NotEq => "!=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::In => "in",
            Comparator::Matches => "matches",
            Comparator::Contains => "contains",
        }
    }

    /// Whether the operator can compare two counts
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Comparator::Eq
                | Comparator::NotEq
                | Comparator::Gt
                | Comparator::Gte
                | Comparator::Lt
                | Comparator::Lte
        )
    }

    /// Compare two counts; non-numeric operators never hold
    pub fn compare_counts(&self, left: usize, right: usize) -> bool {
        match self {
            Comparator::Eq => left == right,
            Comparator::NotEq => left != right,
            Comparator::Gt => left > right,
            Comparator::Gte => left >= right,
            Comparator::Lt => left < right,
            Comparator::Lte => left <= right,
            Comparator::In | Comparator::Matches | Comparator::Contains => false,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A regex compiled at parse time, compared and serialized by its source
#[derive(Debug, Clone)]
pub struct RegexLiteral {
    source: String,
    regex: Arc<Regex>,
}

impl RegexLiteral {
    /// Wrap an already validated regex
    pub fn new(source: impl Into<String>, regex: Regex) -> Self {
        Self {
            source: source.into(),
            regex: Arc::new(regex),
        }
    }

    /// Pattern text as written in the rule
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled regex
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl PartialEq for RegexLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for RegexLiteral {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

/// Literal value on the right-hand side of a where clause
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    /// Quoted string
    String(String),
    /// Integer or decimal number
    Number(f64),
    /// `true` / `false`
    Bool(bool),
    /// `[a, b, ...]`, only valid with `in`
    List(Vec<Literal>),
    /// String operand of `matches`
    Pattern(RegexLiteral),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write_quoted(f, s),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Literal::Pattern(p) => write_quoted(f, p.source()),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

/// What a where clause checks on the named attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttributeTest {
    /// `attribute <operator> <value>`
    Compare {
        /// Comparison operator
        operator: Comparator,
        /// Right-hand side
        value: Literal,
    },
    /// Bare `attribute`: present and truthy
    Truthy,
}

/// A `.where(...)` filter on a `has` check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereClause {
    /// Dotted attribute name
    pub attribute: String,
    /// Test applied to the attribute
    pub test: AttributeTest,
    /// Written with a leading `not`
    pub negated: bool,
}

impl WhereClause {
    /// `attribute <operator> <value>`
    pub fn compare(attribute: impl Into<String>, operator: Comparator, value: Literal) -> Self {
        Self {
            attribute: attribute.into(),
            test: AttributeTest::Compare { operator, value },
            negated: false,
        }
    }

    /// Bare `attribute`
    pub fn truthy(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            test: AttributeTest::Truthy,
            negated: false,
        }
    }

    /// Negate the clause
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("not ")?;
        }
        f.write_str(&self.attribute)?;
        if let AttributeTest::Compare { operator, value } = &self.test {
            write!(f, " {} {}", operator, value)?;
        }
        Ok(())
    }
}

/// Right-hand side of a count check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CountOperand {
    /// Whole number literal
    Literal {
        /// Value
        value: u64,
    },
    /// Another `trace.count(...)`
    #[serde(rename_all = "camelCase")]
    Count {
        /// Counted operation name
        span_name: String,
    },
}

impl fmt::Display for CountOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountOperand::Literal { value } => write!(f, "{}", value),
            CountOperand::Count { span_name } => write!(f, "trace.count({})", span_name),
        }
    }
}

/// A parsed rule expression
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleExpression {
    /// `left and right` / `left or right`
    Binary {
        /// Combinator
        operator: LogicalOp,
        /// Left operand
        left: Box<RuleExpression>,
        /// Right operand
        right: Box<RuleExpression>,
    },
    /// `not <term>`
    Not {
        /// Negated term
        inner: Box<RuleExpression>,
    },
    /// `trace.has(name).where(...)*`
    #[serde(rename_all = "camelCase")]
    Has {
        /// Operation name to look for
        span_name: String,
        /// Implicitly AND-ed filters, in source order
        where_clauses: Vec<WhereClause>,
    },
    /// `trace.count(name) <op> <operand>`
    #[serde(rename_all = "camelCase")]
    Count {
        /// Operation name to count
        span_name: String,
        /// Comparison operator
        operator: Comparator,
        /// Literal or second count
        operand: CountOperand,
    },
}

impl RuleExpression {
    /// `trace.has(span_name)` with no filters
    pub fn has(span_name: impl Into<String>) -> Self {
        RuleExpression::Has {
            span_name: span_name.into(),
            where_clauses: Vec::new(),
        }
    }

    /// `trace.count(span_name) <operator> <operand>`
    pub fn count(span_name: impl Into<String>, operator: Comparator, operand: CountOperand) -> Self {
        RuleExpression::Count {
            span_name: span_name.into(),
            operator,
            operand,
        }
    }

    /// Append a where clause; no-op on anything but `Has`
    pub fn with_where(mut self, clause: WhereClause) -> Self {
        if let RuleExpression::Has { where_clauses, .. } = &mut self {
            where_clauses.push(clause);
        }
        self
    }

    /// Combine with another expression
    pub fn binary(left: RuleExpression, operator: LogicalOp, right: RuleExpression) -> Self {
        RuleExpression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Negate an expression
    pub fn negate(inner: RuleExpression) -> Self {
        RuleExpression::Not {
            inner: Box::new(inner),
        }
    }

    /// Depth of the tree, a single check being 1
    pub fn depth(&self) -> usize {
        match self {
            RuleExpression::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
            RuleExpression::Not { inner } => 1 + inner.depth(),
            RuleExpression::Has { .. } | RuleExpression::Count { .. } => 1,
        }
    }

    /// Every operation name referenced by the expression
    pub fn span_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_span_names(&mut names);
        names
    }

    fn collect_span_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            RuleExpression::Binary { left, right, .. } => {
                left.collect_span_names(names);
                right.collect_span_names(names);
            }
            RuleExpression::Not { inner } => inner.collect_span_names(names),
            RuleExpression::Has { span_name, .. } => names.push(span_name),
            RuleExpression::Count {
                span_name, operand, ..
            } => {
                names.push(span_name);
                if let CountOperand::Count { span_name } = operand {
                    names.push(span_name);
                }
            }
        }
    }
}

impl fmt::Display for RuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleExpression::Binary {
                operator,
                left,
                right,
            } => write!(f, "{} {} {}", left, operator, right),
            RuleExpression::Not { inner } => write!(f, "not {}", inner),
            RuleExpression::Has {
                span_name,
                where_clauses,
            } => {
                write!(f, "trace.has({})", span_name)?;
                for clause in where_clauses {
                    write!(f, ".where({})", clause)?;
                }
                Ok(())
            }
            RuleExpression::Count {
                span_name,
                operator,
                operand,
            } => write!(f, "trace.count({}) {} {}", span_name, operator, operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_canonical() {
        let expr = RuleExpression::binary(
            RuleExpression::has("payment.charge")
                .with_where(WhereClause::compare("amount", Comparator::Gt, Literal::Number(1000.0)))
                .with_where(WhereClause::truthy("retried").negate()),
            LogicalOp::And,
            RuleExpression::negate(RuleExpression::count(
                "http.request",
                Comparator::NotEq,
                CountOperand::Count {
                    span_name: "http.response".into(),
                },
            )),
        );
        assert_eq!(
            expr.to_string(),
            "trace.has(payment.charge).where(amount > 1000).where(not retried) and \
             not trace.count(http.request) != trace.count(http.response)"
        );
        assert_eq!(expr.depth(), 3);
        assert_eq!(
            expr.span_names(),
            vec!["payment.charge", "http.request", "http.response"]
        );
    }

    #[test]
    fn test_string_literal_escaping() {
        let lit = Literal::String(r#"a "b" \d"#.into());
        assert_eq!(lit.to_string(), r#""a \"b\" \\d""#);
        let list = Literal::List(vec![Literal::String("us".into()), Literal::Number(2.5), Literal::Bool(true)]);
        assert_eq!(list.to_string(), r#"["us", 2.5, true]"#);
    }

    #[test]
    fn test_serialized_shape() {
        let expr = RuleExpression::count("db.query", Comparator::Gte, CountOperand::Literal { value: 3 });
        assert_eq!(
            serde_json::to_value(&expr).unwrap(),
            serde_json::json!({
                "type": "count",
                "spanName": "db.query",
                "operator": ">=",
                "operand": {"kind": "literal", "value": 3}
            })
        );
    }
}
