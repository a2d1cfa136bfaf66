//! Server-side middlewares: read what client middlewares wrote.
//!
//! - [`ReadDeadlineBudgetLayer`] turns `Deadline-Budget` into a deadline
//! - [`InjectEdgeContextLayer`] decodes `Edge-Request` into the context
//! - [`InjectTraceContextLayer`] adopts the caller's `traceparent` as parent span

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use crate::call::{Call, Response};
use crate::error::RpcError;
use crate::headers::{DEADLINE_BUDGET, EDGE_REQUEST, TRACEPARENT};
use crate::middleware::CallFuture;
use crate::middleware::headers::{EdgeContextCodec, PassthroughEdgeContext};
use crate::trace::SpanContext;

/// Adjusts an incoming call before it reaches the wrapped service.
pub trait Inject: Clone + Send + Sync + 'static {
    /// Read headers of `call` into its context.
    fn inject(&self, call: &mut Call);
}

/// Server-side header service wrapper
#[derive(Clone)]
pub struct InjectService<S, I> {
    inner: S,
    injector: I,
}

impl<S, I> Service<Call> for InjectService<S, I>
where
    S: Service<Call, Response = Response, Error = RpcError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    I: Inject,
{
    type Response = Response;
    type Error = RpcError;
    type Future = CallFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut call: Call) -> Self::Future {
        self.injector.inject(&mut call);
        Box::pin(self.inner.clone().oneshot(call))
    }
}

/// Deadline budget reading layer for Tower
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadDeadlineBudgetLayer;

impl Inject for ReadDeadlineBudgetLayer {
    fn inject(&self, call: &mut Call) {
        let Some(raw) = call.context.headers.get(DEADLINE_BUDGET) else {
            return;
        };
        match raw.trim().parse::<u64>() {
            Ok(millis) if millis > 0 => {
                let deadline = Instant::now() + Duration::from_millis(millis);
                call.context.tighten_deadline(deadline);
            }
            _ => debug!(value = %raw, "ignoring invalid deadline budget"),
        }
    }
}

impl<S> Layer<S> for ReadDeadlineBudgetLayer {
    type Service = InjectService<S, Self>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectService {
            inner,
            injector: *self,
        }
    }
}

/// Edge context decoding layer for Tower
#[derive(Clone)]
pub struct InjectEdgeContextLayer {
    codec: Arc<dyn EdgeContextCodec>,
}

impl InjectEdgeContextLayer {
    /// Decode using `codec`.
    pub fn new(codec: Arc<dyn EdgeContextCodec>) -> Self {
        Self { codec }
    }
}

impl Default for InjectEdgeContextLayer {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughEdgeContext))
    }
}

impl Inject for InjectEdgeContextLayer {
    fn inject(&self, call: &mut Call) {
        let decoded = call
            .context
            .headers
            .get(EDGE_REQUEST)
            .and_then(|header| self.codec.decode(header));
        if let Some(edge) = decoded {
            call.context.set_edge_context(edge);
        }
    }
}

impl<S> Layer<S> for InjectEdgeContextLayer {
    type Service = InjectService<S, Self>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectService {
            inner,
            injector: self.clone(),
        }
    }
}

/// Trace context adoption layer for Tower
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectTraceContextLayer;

impl Inject for InjectTraceContextLayer {
    fn inject(&self, call: &mut Call) {
        let parent = call
            .context
            .headers
            .get(TRACEPARENT)
            .map(String::as_str)
            .and_then(SpanContext::from_traceparent);
        if let Some(parent) = parent {
            call.context.set_span(parent);
        }
    }
}

impl<S> Layer<S> for InjectTraceContextLayer {
    type Service = InjectService<S, Self>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectService {
            inner,
            injector: *self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallContext;
    use crate::middleware::handler_fn;
    use parking_lot::Mutex;

    fn incoming(headers: &[(&str, &str)]) -> Call {
        let mut call = Call::new("Ping", "");
        for (k, v) in headers {
            call.context.headers.insert((*k).to_string(), (*v).to_string());
        }
        call
    }

    /// Runs `call` through `layer` and returns the context the handler saw.
    async fn seen<L>(layer: L, call: Call) -> CallContext
    where
        L: Layer<crate::middleware::CallHandler>,
        L::Service: Service<Call, Response = Response, Error = RpcError>,
    {
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let handler = handler_fn(move |call: Call| {
            *slot.lock() = Some(call.context);
            async { Ok(Response::success("")) }
        });
        layer.layer(handler).oneshot(call).await.unwrap();
        seen.lock().take().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_becomes_deadline() {
        let ctx = seen(ReadDeadlineBudgetLayer, incoming(&[(DEADLINE_BUDGET, "1500")])).await;
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(1500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_budget_ignored() {
        for value in ["", "abc", "0", "-5"] {
            let ctx = seen(ReadDeadlineBudgetLayer, incoming(&[(DEADLINE_BUDGET, value)])).await;
            assert_eq!(ctx.deadline(), None);
        }
    }

    #[tokio::test]
    async fn test_edge_context_decoded() {
        let ctx = seen(
            InjectEdgeContextLayer::default(),
            incoming(&[(EDGE_REQUEST, "blob")]),
        )
        .await;
        assert_eq!(ctx.edge_context().map(|e| e.as_str()), Some("blob"));
    }

    #[tokio::test]
    async fn test_traceparent_adopted() {
        let parent = SpanContext::new_root();
        let header = parent.to_traceparent();
        let ctx = seen(
            InjectTraceContextLayer,
            incoming(&[(TRACEPARENT, header.as_str())]),
        )
        .await;
        assert_eq!(ctx.span(), Some(&parent));
    }

    #[tokio::test]
    async fn test_malformed_traceparent_ignored() {
        let ctx = seen(
            InjectTraceContextLayer,
            incoming(&[(TRACEPARENT, "00-not-a-trace-01")]),
        )
        .await;
        assert_eq!(ctx.span(), None);
    }
}
