//! Diagnostics sanitization boundary
//!
//! Diagnostic messages quote raw rule text. Before a message is shown to
//! anyone it goes through [`DiagnosticRenderer`], which redacts secrets,
//! truncates it and escapes what is left for the surface it will be embedded in.

pub mod redact;

pub use redact::{contains_sensitive, redact};

use crate::config::MAX_MESSAGE_LENGTH;
use crate::diagnostic::{ParseResult, ValidationError};
use serde::Deserialize;
use std::fmt::Write as _;
use std::str::FromStr;

/// Marker appended to truncated messages
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// Surface a diagnostic is rendered into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputContext {
    /// HTML element content or attribute values
    Html,
    /// Inside a JavaScript string literal
    #[serde(alias = "js")]
    JavaScript,
    /// Inside a JSON string
    Json,
    /// Markdown text
    Markdown,
    /// Terminal or log output
    Plain,
}

impl FromStr for OutputContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(OutputContext::Html),
            "js" | "javascript" => Ok(OutputContext::JavaScript),
            "json" => Ok(OutputContext::Json),
            "md" | "markdown" => Ok(OutputContext::Markdown),
            "plain" | "text" => Ok(OutputContext::Plain),
            other => Err(format!("unknown output context: {}", other)),
        }
    }
}

/// Escape `text` for the given output context
pub fn escape(text: &str, context: OutputContext) -> String {
    match context {
        OutputContext::Html => escape_html(text),
        OutputContext::JavaScript => escape_js(text),
        OutputContext::Json => escape_json(text),
        OutputContext::Markdown => escape_markdown(text),
        OutputContext::Plain => escape_controls(text),
    }
}

/// Make untrusted text safe to quote inside a message
///
/// Secrets are redacted from the whole text before anything is cut, control
/// and bidi-override characters are shown as escapes and the result is capped
/// at `max_chars` characters.
pub fn display_safe(text: &str, max_chars: usize) -> String {
    let escaped = escape_controls(&redact(text));
    match cut_point(&escaped, max_chars) {
        Some(end) => format!("{}...", &escaped[..end]),
        None => escaped,
    }
}

/// Cap `text` at `max_chars` characters, appending [`TRUNCATION_MARKER`]
///
/// A cut that would split a redaction placeholder moves to its start.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match cut_point(text, max_chars) {
        Some(end) => format!("{}{}", &text[..end], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Byte offset keeping at most `max_chars` characters, never inside a placeholder
fn cut_point(text: &str, max_chars: usize) -> Option<usize> {
    let (end, _) = text.char_indices().nth(max_chars)?;
    let split = redact::PLACEHOLDER.as_ref().and_then(|placeholder| {
        placeholder
            .find_iter(text)
            .find(|m| m.start() < end && end < m.end())
    });
    Some(split.map_or(end, |m| m.start()))
}

fn is_unsafe_char(c: char) -> bool {
    c.is_control() || matches!(c, '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}

fn escape_controls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if is_unsafe_char(c) => {
                let _ = write!(out, "\\u{{{:04x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            c if is_unsafe_char(c) => {
                let _ = write!(out, "&#x{:X};", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_js(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '/' => out.push_str("\\/"),
            // keep the text inert inside an inline <script> block
            '<' | '>' | '&' | '\u{2028}' | '\u{2029}' => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c if is_unsafe_char(c) => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_json(text: &str) -> String {
    let quoted = serde_json::Value::String(text.to_string()).to_string();
    let inner = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(&quoted);
    inner
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in escape_controls(text).chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\\' | '`' | '*' | '_' | '{' | '}' | '[' | ']' | '(' | ')' | '#' | '+' | '!' | '|'
            | '~' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Renders diagnostics for a specific output surface
#[derive(Debug, Clone)]
pub struct DiagnosticRenderer {
    context: OutputContext,
    max_message_length: usize,
}

impl DiagnosticRenderer {
    /// Create a renderer for `context`
    pub fn new(context: OutputContext) -> Self {
        Self {
            context,
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }

    /// Override the truncation length
    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    /// Output context this renderer escapes for
    pub fn context(&self) -> OutputContext {
        self.context
    }

    /// Redact, truncate and escape one message
    ///
    /// Redaction runs on the whole unescaped text so neither the length cap nor
    /// escaping can split a secret into pieces the patterns no longer
    /// recognise; placeholders themselves are emitted verbatim.
    pub fn render_message(&self, message: &str) -> String {
        let redacted = truncate(&redact(message), self.max_message_length);

        let Some(placeholder) = redact::PLACEHOLDER.as_ref() else {
            return escape(&redacted, self.context);
        };
        let mut out = String::with_capacity(redacted.len());
        let mut last = 0;
        for found in placeholder.find_iter(&redacted) {
            out.push_str(&escape(&redacted[last..found.start()], self.context));
            out.push_str(found.as_str());
            last = found.end();
        }
        out.push_str(&escape(&redacted[last..], self.context));
        out
    }

    /// Sanitized copy of a diagnostic
    pub fn render(&self, diagnostic: &ValidationError) -> ValidationError {
        ValidationError {
            message: self.render_message(&diagnostic.message),
            suggestion: diagnostic.suggestion.as_deref().map(|s| self.render_message(s)),
            ..diagnostic.clone()
        }
    }

    /// Sanitized copy of a parse result; the AST is carried unchanged
    pub fn render_result(&self, result: &ParseResult) -> ParseResult {
        ParseResult {
            valid: result.valid,
            errors: result.errors.iter().map(|e| self.render(e)).collect(),
            warnings: result.warnings.iter().map(|w| self.render(w)).collect(),
            ast: result.ast.clone(),
        }
    }
}
