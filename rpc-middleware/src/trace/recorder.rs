//! Span recorders.

use tracing::{info, warn};

use super::span::FinishedSpan;

/// Receives every finished span.
pub trait SpanRecorder: Send + Sync + 'static {
    /// Record a finished span.
    fn record(&self, span: FinishedSpan);
}

/// Emits finished spans as structured `tracing` events on the `rpc_span`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSpanRecorder;

impl SpanRecorder for LogSpanRecorder {
    fn record(&self, span: FinishedSpan) {
        if !span.sampled {
            return;
        }
        if span.success {
            info!(
                target: "rpc_span",
                name = %span.name,
                kind = ?span.kind,
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                parent_id = span.parent_id.as_deref().unwrap_or(""),
                duration_us = span.duration_us,
                "span finished"
            );
        } else {
            warn!(
                target: "rpc_span",
                name = %span.name,
                kind = ?span.kind,
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                parent_id = span.parent_id.as_deref().unwrap_or(""),
                duration_us = span.duration_us,
                error = span.error.as_deref().unwrap_or(""),
                "span failed"
            );
        }
    }
}

/// Exports finished spans through the global OpenTelemetry tracer provider.
#[cfg(feature = "otel")]
pub struct OtelSpanRecorder {
    tracer: opentelemetry::global::BoxedTracer,
}

#[cfg(feature = "otel")]
impl OtelSpanRecorder {
    /// Create a recorder using the global tracer named `instrumentation`.
    #[must_use]
    pub fn new(instrumentation: &'static str) -> Self {
        Self {
            tracer: opentelemetry::global::tracer(instrumentation),
        }
    }
}

#[cfg(feature = "otel")]
impl std::fmt::Debug for OtelSpanRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelSpanRecorder").finish_non_exhaustive()
    }
}

#[cfg(feature = "otel")]
impl SpanRecorder for OtelSpanRecorder {
    fn record(&self, span: FinishedSpan) {
        use opentelemetry::KeyValue;
        use opentelemetry::trace::{Span as _, SpanKind as OtelKind, Status, Tracer as _};
        use std::time::SystemTime;

        let kind = match span.kind {
            super::SpanKind::Client => OtelKind::Client,
            super::SpanKind::Server => OtelKind::Server,
        };
        let attributes: Vec<KeyValue> = span
            .tags
            .into_iter()
            .map(|(k, v)| KeyValue::new(k, v))
            .collect();

        let mut otel_span = self
            .tracer
            .span_builder(span.name)
            .with_kind(kind)
            .with_start_time(SystemTime::from(span.started_at))
            .with_attributes(attributes)
            .start(&self.tracer);
        otel_span.set_status(match span.error {
            Some(description) => Status::error(description),
            None => Status::Ok,
        });
        otel_span.end_with_timestamp(SystemTime::from(span.finished_at));
    }
}
