//! Spans and span recording.
//!
//! A [`Span`] is started by the span middleware and finished exactly once,
//! either with the call's outcome or as abandoned when the call future is
//! dropped. Finished spans go to a [`SpanRecorder`].

mod context;
mod recorder;
mod span;

pub use context::SpanContext;
#[cfg(feature = "otel")]
pub use recorder::OtelSpanRecorder;
pub use recorder::{LogSpanRecorder, SpanRecorder};
pub use span::{FinishedSpan, Span, SpanKind, SpanStatus};
