//! Metrics middleware.
//!
//! Counts each call as active while it runs, then records its latency and
//! outcome. Metrics always reflect the real outcome; span suppression does
//! not apply here.

use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

use crate::call::{Call, Response};
use crate::classify::classify_outcome;
use crate::error::RpcError;
use crate::metrics::{MetricLabelSet, RpcMetrics};
use crate::middleware::CallFuture;

/// Metrics layer for Tower
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    metrics: Arc<RpcMetrics>,
    target: Arc<str>,
}

impl MetricsLayer {
    /// Record into `metrics` with the given `target` label.
    pub fn new(metrics: Arc<RpcMetrics>, target: impl Into<Arc<str>>) -> Self {
        Self {
            metrics,
            target: target.into(),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: Arc::clone(&self.metrics),
            target: Arc::clone(&self.target),
        }
    }
}

/// Metrics service wrapper
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RpcMetrics>,
    target: Arc<str>,
}

impl<S> Service<Call> for MetricsService<S>
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

    fn call(&mut self, call: Call) -> Self::Future {
        let inner = self.inner.clone();
        let metrics = Arc::clone(&self.metrics);
        let target = Arc::clone(&self.target);

        Box::pin(async move {
            let method = call.method.clone();
            let call_type = call.call_type;
            let active = metrics.start(&method, &target);
            let start = Instant::now();

            let outcome = inner.oneshot(call).await;

            let labels =
                MetricLabelSet::from_outcome(&method, call_type, &target, &classify_outcome(&outcome));
            metrics.observe(&labels, start.elapsed());
            drop(active);
            outcome
        })
    }
}
