//! Deadline budget propagation.
//!
//! Writes the time left before the call's deadline into the
//! `Deadline-Budget` header so the server can stop working on calls the
//! client has already given up on. A call whose context is already done
//! fails here without reaching the transport.

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use crate::call::{Call, Response};
use crate::error::RpcError;
use crate::headers::DEADLINE_BUDGET;
use crate::middleware::CallFuture;

/// Budget in whole milliseconds: rounded up, never below 1.
#[must_use]
pub fn budget_millis(remaining: Duration) -> u64 {
    let millis = remaining.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

/// Deadline budget layer for Tower
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineBudgetLayer;

impl DeadlineBudgetLayer {
    /// Create the layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for DeadlineBudgetLayer {
    type Service = DeadlineBudgetService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeadlineBudgetService { inner }
    }
}

/// Deadline budget service wrapper
#[derive(Debug, Clone)]
pub struct DeadlineBudgetService<S> {
    inner: S,
}

impl<S> Service<Call> for DeadlineBudgetService<S>
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
        if let Some(err) = call.context.done_error() {
            debug!(method = %call.method, error = %err, "call context already done");
            return Box::pin(futures::future::ready(Err(err)));
        }

        if let Some(remaining) = call.context.remaining() {
            call.context.headers.insert(
                DEADLINE_BUDGET.to_string(),
                budget_millis(remaining).to_string(),
            );
        }

        let inner = self.inner.clone();
        Box::pin(inner.oneshot(call))
    }
}
