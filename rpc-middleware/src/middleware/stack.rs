//! Default middleware stacks.
//!
//! Client order, outermost first:
//! 1. Edge context forwarding
//! 2. Client name
//! 3. Span and metrics for the whole call, retries included (`{slug}-with-retry`)
//! 4. Circuit breaker, when configured
//! 5. Retry
//! 6. Span and metrics per attempt (`{slug}`)
//! 7. Remote status translation
//! 8. Deadline budget
//!
//! Server order: deadline budget, edge context and trace context are read
//! from headers, then the server span and metrics wrap the handler.

use std::sync::Arc;

use prometheus::Registry;
use rpc_common::{BreakerMetrics, FailureRatioBreaker};

use crate::config::ClientConfig;
use crate::metrics::RpcMetrics;
use crate::middleware::{
    ApplicationErrorLayer, BreakerLayer, ClientNameLayer, DeadlineBudgetLayer,
    ForwardEdgeContextLayer, InjectEdgeContextLayer, InjectTraceContextLayer, MetricsLayer,
    Middleware, ReadDeadlineBudgetLayer, RetryLayer, SpanLayer,
};
use crate::trace::{LogSpanRecorder, SpanRecorder};

/// Suffix of the slug used by the span and metrics middlewares outside retry.
pub const WRAPPED_SLUG_SUFFIX: &str = "-with-retry";

/// Shared metric and span sinks for every chain in the process.
#[derive(Clone)]
pub struct Observability {
    /// Call metrics
    pub metrics: Arc<RpcMetrics>,
    /// Span sink
    pub recorder: Arc<dyn SpanRecorder>,
    /// Breaker state metrics
    pub breaker_metrics: Option<Arc<BreakerMetrics>>,
}

impl std::fmt::Debug for Observability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observability")
            .field("metrics", &self.metrics)
            .field("breaker_metrics", &self.breaker_metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl Observability {
    /// Client-side sinks registered with `registry`, spans logged.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            metrics: Arc::new(RpcMetrics::new(registry)?),
            recorder: Arc::new(LogSpanRecorder),
            breaker_metrics: Some(Arc::new(BreakerMetrics::new(registry)?)),
        })
    }

    /// Server-side sinks, with metrics under the `server` namespace.
    pub fn server(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            metrics: Arc::new(RpcMetrics::with_namespace(registry, "server")?),
            recorder: Arc::new(LogSpanRecorder),
            breaker_metrics: None,
        })
    }

    /// Replace the span recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn SpanRecorder>) -> Self {
        self.recorder = recorder;
        self
    }
}

/// The default client middlewares for `config`, outermost first.
#[must_use]
pub fn default_client_middlewares(
    config: &ClientConfig,
    observability: &Observability,
) -> Vec<Arc<dyn Middleware>> {
    let slug = config.service_slug.as_str();
    let wrapped_slug = format!("{slug}{WRAPPED_SLUG_SUFFIX}");
    let recorder = &observability.recorder;
    let metrics = &observability.metrics;

    let mut middlewares: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(ForwardEdgeContextLayer::new(Arc::clone(&config.edge_context))),
        Arc::new(ClientNameLayer::new(config.client_name.as_str())),
        Arc::new(
            SpanLayer::client(&wrapped_slug, Arc::clone(recorder))
                .with_suppressor(Arc::clone(&config.suppressor)),
        ),
        Arc::new(MetricsLayer::new(Arc::clone(metrics), wrapped_slug.as_str())),
    ];

    if let Some(breaker_config) = &config.breaker {
        let mut breaker = FailureRatioBreaker::new(breaker_config.clone());
        if let Some(breaker_metrics) = &observability.breaker_metrics {
            breaker = breaker.with_metrics(Arc::clone(breaker_metrics));
        }
        middlewares.push(Arc::new(BreakerLayer::shared(Arc::new(breaker))));
    }

    middlewares.push(Arc::new(RetryLayer::with_filters(
        config.retry.clone(),
        config.retry_filters.clone(),
    )));
    middlewares.push(Arc::new(
        SpanLayer::client(slug, Arc::clone(recorder))
            .with_suppressor(Arc::clone(&config.suppressor)),
    ));
    middlewares.push(Arc::new(MetricsLayer::new(Arc::clone(metrics), slug)));
    middlewares.push(Arc::new(ApplicationErrorLayer::new()));
    middlewares.push(Arc::new(DeadlineBudgetLayer::new()));
    middlewares
}

/// The default server middlewares for `service_slug`, outermost first.
#[must_use]
pub fn default_server_middlewares(
    service_slug: &str,
    observability: &Observability,
) -> Vec<Arc<dyn Middleware>> {
    let middlewares: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(ReadDeadlineBudgetLayer),
        Arc::new(InjectEdgeContextLayer::default()),
        Arc::new(InjectTraceContextLayer),
        Arc::new(SpanLayer::server(Arc::clone(&observability.recorder))),
        Arc::new(MetricsLayer::new(
            Arc::clone(&observability.metrics),
            service_slug,
        )),
    ];
    middlewares
}
