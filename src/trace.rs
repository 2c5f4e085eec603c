//! Trace and span data evaluated by rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Typed span attribute value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttributeValue {
    /// String value - using Arc for cheap cloning
    String(Arc<str>),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Array of values
    Array(Vec<AttributeValue>),
    /// Null value
    #[default]
    Null,
}

impl AttributeValue {
    /// Numeric view, if the value is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String form used by `matches` and `contains`
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            AttributeValue::String(s) => Cow::Borrowed(&**s),
            AttributeValue::Integer(i) => Cow::Owned(i.to_string()),
            AttributeValue::Float(f) => Cow::Owned(f.to_string()),
            AttributeValue::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            AttributeValue::Array(items) => Cow::Owned(
                items
                    .iter()
                    .map(|v| v.to_text().into_owned())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            AttributeValue::Null => Cow::Borrowed(""),
        }
    }

    /// Truthiness used by bare and negated where clauses
    pub fn is_truthy(&self) -> bool {
        match self {
            AttributeValue::Boolean(b) => *b,
            AttributeValue::String(s) => {
                let s = s.trim();
                !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
            }
            AttributeValue::Integer(i) => *i != 0,
            AttributeValue::Float(f) => *f != 0.0 && !f.is_nan(),
            AttributeValue::Array(items) => !items.is_empty(),
            AttributeValue::Null => false,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(Arc::from(s))
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(Arc::from(s))
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(items: Vec<T>) -> Self {
        AttributeValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<JsonValue> for AttributeValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::String(s) => AttributeValue::String(Arc::from(s)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Integer(i),
                None => n.as_f64().map(AttributeValue::Float).unwrap_or_default(),
            },
            JsonValue::Bool(b) => AttributeValue::Boolean(b),
            JsonValue::Array(items) => {
                AttributeValue::Array(items.into_iter().map(AttributeValue::from).collect())
            }
            // nested objects are kept as their JSON text
            JsonValue::Object(map) => {
                AttributeValue::String(Arc::from(JsonValue::Object(map).to_string()))
            }
            JsonValue::Null => AttributeValue::Null,
        }
    }
}

// Custom Serialize/Deserialize to handle Arc<str> transparently
impl Serialize for AttributeValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AttributeValue::String(s) => serializer.serialize_str(s),
            AttributeValue::Integer(i) => serializer.serialize_i64(*i),
            AttributeValue::Float(f) => serializer.serialize_f64(*f),
            AttributeValue::Boolean(b) => serializer.serialize_bool(*b),
            AttributeValue::Array(items) => items.serialize(serializer),
            AttributeValue::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        JsonValue::deserialize(deserializer).map(AttributeValue::from)
    }
}

/// Span completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    /// Status not set by the instrumentation
    #[default]
    #[serde(alias = "unset")]
    Unset,
    /// Completed successfully
    #[serde(alias = "ok")]
    Ok,
    /// Completed with an error
    #[serde(alias = "error")]
    Error,
}

impl SpanStatus {
    /// Wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Unset => "UNSET",
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        }
    }
}

/// One unit of work within a trace
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Span identifier
    #[serde(default)]
    pub span_id: String,
    /// Owning trace, when the producer sends it per span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Dotted operation name
    #[serde(alias = "name")]
    pub operation_name: String,
    /// Emitting service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Typed attributes
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
    /// Completion status
    #[serde(default)]
    pub status: SpanStatus,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration_ms: f64,
    /// Start timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl Span {
    /// Create a span with the given operation name
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Self::default()
        }
    }

    /// Set the span id
    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = span_id.into();
        self
    }

    /// Set the service name
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service_name = Some(service.into());
        self
    }

    /// Set one attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the duration
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the start time
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Resolve an attribute by name
    ///
    /// Built-in fields (`operationName`/`name`, `serviceName`, `status`,
    /// `duration`/`durationMs`, `spanId`) win over the attribute map when
    /// they carry a value; an unset status or missing service falls through
    /// to the map.
    pub fn attribute(&self, name: &str) -> Option<Cow<'_, AttributeValue>> {
        let builtin = match name {
            "operationName" | "name" => Some(AttributeValue::from(self.operation_name.as_str())),
            "serviceName" => self.service_name.as_deref().map(AttributeValue::from),
            "status" if self.status != SpanStatus::Unset => {
                Some(AttributeValue::from(self.status.as_str()))
            }
            "duration" | "durationMs" => Some(AttributeValue::Float(self.duration_ms)),
            "spanId" if !self.span_id.is_empty() => Some(AttributeValue::from(self.span_id.as_str())),
            _ => None,
        };
        builtin
            .map(Cow::Owned)
            .or_else(|| self.attributes.get(name).map(Cow::Borrowed))
    }
}

/// An ordered collection of spans sharing a trace id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Trace identifier
    pub trace_id: String,
    /// Spans in recorded order
    #[serde(default)]
    pub spans: Vec<Span>,
}

impl Trace {
    /// Create a trace
    pub fn new(trace_id: impl Into<String>, spans: Vec<Span>) -> Self {
        Self {
            trace_id: trace_id.into(),
            spans,
        }
    }

    /// Spans that name a different trace id than the trace itself
    pub fn foreign_spans(&self) -> impl Iterator<Item = &Span> {
        self.spans
            .iter()
            .filter(|s| s.trace_id.as_deref().is_some_and(|id| id != self.trace_id))
    }
}
