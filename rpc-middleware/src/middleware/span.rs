//! Span middleware.
//!
//! Opens a span per call, makes it the call's active span and finishes it
//! with the classified outcome. Errors the suppressor hides leave the span
//! marked successful. A span whose call future is dropped is finished as
//! abandoned.

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};

use crate::call::{Call, Response};
use crate::classify::classify_outcome;
use crate::error::RpcError;
use crate::headers::TRACEPARENT;
use crate::middleware::CallFuture;
use crate::suppress::{Suppressor, default_suppressor};
use crate::trace::{Span, SpanKind, SpanRecorder, SpanStatus};

/// Span layer for Tower
#[derive(Clone)]
pub struct SpanLayer {
    prefix: String,
    kind: SpanKind,
    suppressor: Arc<dyn Suppressor>,
    recorder: Arc<dyn SpanRecorder>,
}

impl SpanLayer {
    /// Client spans named `{service_slug}.{method}`, or just the method name
    /// when the slug is empty.
    pub fn client(service_slug: &str, recorder: Arc<dyn SpanRecorder>) -> Self {
        let prefix = if service_slug.is_empty() {
            String::new()
        } else {
            format!("{service_slug}.")
        };
        Self {
            prefix,
            kind: SpanKind::Client,
            suppressor: default_suppressor(),
            recorder,
        }
    }

    /// Server spans named after the method.
    pub fn server(recorder: Arc<dyn SpanRecorder>) -> Self {
        Self {
            prefix: String::new(),
            kind: SpanKind::Server,
            suppressor: default_suppressor(),
            recorder,
        }
    }

    /// Replace the error suppressor.
    #[must_use]
    pub fn with_suppressor(mut self, suppressor: Arc<dyn Suppressor>) -> Self {
        self.suppressor = suppressor;
        self
    }
}

impl<S> Layer<S> for SpanLayer {
    type Service = SpanService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SpanService {
            inner,
            layer: self.clone(),
        }
    }
}

/// Span service wrapper
#[derive(Clone)]
pub struct SpanService<S> {
    inner: S,
    layer: SpanLayer,
}

impl<S> Service<Call> for SpanService<S>
where
    S: Service<Call, Response = Response, Error = RpcError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = RpcError;
    type Future = CallFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut call: Call) -> Self::Future {
        let inner = self.inner.clone();
        let suppressor = Arc::clone(&self.layer.suppressor);

        let mut span = Span::start(
            format!("{}{}", self.layer.prefix, call.method),
            self.layer.kind,
            call.context.span(),
        );
        span.set_tag("rpc.method", call.method.clone());
        span.set_tag("rpc.call_type", call.call_type.as_str());
        let span_context = *span.context();
        call.context.set_span(span_context);
        if self.layer.kind == SpanKind::Client {
            call.context
                .headers
                .insert(TRACEPARENT.to_string(), span_context.to_traceparent());
        }
        let active = ActiveSpan {
            span: Some(span),
            recorder: Arc::clone(&self.layer.recorder),
        };

        Box::pin(async move {
            let outcome = inner.oneshot(call).await;
            let classification = classify_outcome(&outcome);

            let status = if classification.is_success() {
                SpanStatus::Ok
            } else if suppressor.suppress(&classification) {
                tracing::debug!(
                    exception_type = classification.exception_type(),
                    "span error suppressed"
                );
                SpanStatus::Ok
            } else {
                SpanStatus::error(describe(&outcome))
            };
            active.finish(status);
            outcome
        })
    }
}

fn describe(outcome: &Result<Response, RpcError>) -> String {
    match outcome {
        Err(err) => err.to_string(),
        Ok(response) => response.body.exception().map_or_else(String::new, |exc| {
            format!("{}: {}", exc.type_name, exc.message)
        }),
    }
}

/// Finishes the span exactly once, as abandoned if never finished explicitly.
struct ActiveSpan {
    span: Option<Span>,
    recorder: Arc<dyn SpanRecorder>,
}

impl ActiveSpan {
    fn finish(mut self, status: SpanStatus) {
        if let Some(span) = self.span.take() {
            self.recorder.record(span.finish(status));
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            self.recorder
                .record(span.finish(SpanStatus::error("call abandoned")));
        }
    }
}
