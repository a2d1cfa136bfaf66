//! Span lifecycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::context::SpanContext;

/// Which side of the call a span describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Outgoing call
    Client,
    /// Incoming call
    Server,
}

/// How a span ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    /// Success, or an error the suppressor chose to hide
    Ok,
    /// Failure with a description
    Error(String),
}

impl SpanStatus {
    /// Error status.
    #[must_use]
    pub fn error(description: impl Into<String>) -> Self {
        Self::Error(description.into())
    }
}

/// An in-flight span.
#[derive(Debug)]
pub struct Span {
    name: String,
    kind: SpanKind,
    context: SpanContext,
    parent_id: Option<u64>,
    started_at: DateTime<Utc>,
    tags: BTreeMap<String, String>,
}

impl Span {
    /// Start a span, as a child of `parent` when given or as a new trace.
    #[must_use]
    pub fn start(name: impl Into<String>, kind: SpanKind, parent: Option<&SpanContext>) -> Self {
        let context = parent.map_or_else(SpanContext::new_root, SpanContext::child);
        Self {
            name: name.into(),
            kind,
            context,
            parent_id: parent.map(|p| p.span_id),
            started_at: Utc::now(),
            tags: BTreeMap::new(),
        }
    }

    /// Span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifiers of this span.
    #[must_use]
    pub const fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Attach a tag.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Finish the span.
    #[must_use]
    pub fn finish(self, status: SpanStatus) -> FinishedSpan {
        let finished_at = Utc::now();
        let duration_us = (finished_at - self.started_at)
            .num_microseconds()
            .unwrap_or(i64::MAX)
            .max(0);
        let (success, error) = match status {
            SpanStatus::Ok => (true, None),
            SpanStatus::Error(description) => (false, Some(description)),
        };
        FinishedSpan {
            name: self.name,
            kind: self.kind,
            trace_id: self.context.trace_id_hex(),
            span_id: self.context.span_id_hex(),
            parent_id: self.parent_id.map(|id| format!("{id:016x}")),
            sampled: self.context.sampled,
            started_at: self.started_at,
            finished_at,
            duration_us,
            success,
            error,
            tags: self.tags,
        }
    }
}

/// A finished span ready for recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishedSpan {
    /// Span name
    pub name: String,
    /// Client or server
    pub kind: SpanKind,
    /// Trace id, hex
    pub trace_id: String,
    /// Span id, hex
    pub span_id: String,
    /// Parent span id, hex
    pub parent_id: Option<String>,
    /// Sampling flag
    pub sampled: bool,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in microseconds
    pub duration_us: i64,
    /// Whether the span is annotated as successful
    pub success: bool,
    /// Error description for failed spans
    pub error: Option<String>,
    /// Tags
    pub tags: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_span() {
        let span = Span::start("Ping", SpanKind::Server, None);
        let finished = span.finish(SpanStatus::Ok);
        assert_eq!(finished.name, "Ping");
        assert!(finished.success);
        assert!(finished.parent_id.is_none());
        assert!(finished.duration_us >= 0);
    }

    #[test]
    fn test_child_span_links_parent() {
        let parent = SpanContext::new_root();
        let mut span = Span::start("profile.GetUser", SpanKind::Client, Some(&parent));
        span.set_tag("rpc.method", "GetUser");
        assert_eq!(span.context().trace_id, parent.trace_id);

        let finished = span.finish(SpanStatus::error("Transport error: reset"));
        assert_eq!(finished.parent_id, Some(parent.span_id_hex()));
        assert_eq!(finished.trace_id, parent.trace_id_hex());
        assert!(!finished.success);
        assert_eq!(finished.error.as_deref(), Some("Transport error: reset"));
        assert_eq!(finished.tags.get("rpc.method").map(String::as_str), Some("GetUser"));
    }

    #[test]
    fn test_finished_span_serializes() {
        let finished = Span::start("Ping", SpanKind::Client, None).finish(SpanStatus::Ok);
        let json = serde_json::to_value(&finished).unwrap();
        assert_eq!(json["name"], "Ping");
        assert_eq!(json["kind"], "client");
    }
}
