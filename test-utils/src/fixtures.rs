//! Test fixtures for common call scenarios.

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use rpc_common::{BreakerConfig, RetryConfig};
use rpc_middleware::{
    Call, CallContext, ClientConfig, DeclaredException, Observability, RpcError,
};

use crate::mocks::InMemorySpanRecorder;

/// Name of the declared exception returned by `PingError`.
pub const PING_ERROR: &str = "PingError";

/// Service slug used by fixtures.
pub const SERVICE_SLUG: &str = "pinger";

/// A `Ping` call with a default context.
#[must_use]
pub fn ping_call() -> Call {
    Call::new("Ping", "ping")
}

/// A `Ping` call that must finish within `timeout`.
#[must_use]
pub fn ping_call_with_timeout(timeout: Duration) -> Call {
    ping_call().with_context(CallContext::new().with_timeout(timeout))
}

/// The declared exception `PingError` returns.
#[must_use]
pub fn ping_error() -> DeclaredException {
    DeclaredException::new(PING_ERROR, "ping failed").with_slot(1)
}

/// A retryable transport failure.
#[must_use]
pub fn connection_reset() -> RpcError {
    RpcError::transport("connection reset by peer")
}

/// Retry schedule with `attempts` attempts, short fixed delays and no jitter.
#[must_use]
pub fn fast_retry(attempts: u32) -> RetryConfig {
    RetryConfig::default()
        .with_attempts(attempts)
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(100))
        .without_jitter()
}

/// Breaker that opens after `min_requests` consecutive failures.
#[must_use]
pub fn tripping_breaker(min_requests: u32) -> BreakerConfig {
    BreakerConfig::named(SERVICE_SLUG)
        .with_threshold(0.5)
        .with_min_requests(min_requests)
        .with_open_timeout(Duration::from_secs(30))
}

/// Client config for [`SERVICE_SLUG`] with the given retry schedule.
#[must_use]
pub fn client_config(retry: RetryConfig) -> ClientConfig {
    ClientConfig::new(SERVICE_SLUG)
        .with_client_name("test-client")
        .with_retry(retry)
}

/// Client-side observability on a fresh registry with in-memory spans.
#[must_use]
pub fn observability() -> (Observability, Arc<InMemorySpanRecorder>, Registry) {
    let registry = Registry::new();
    let spans = Arc::new(InMemorySpanRecorder::new());
    let observability = Observability::new(&registry)
        .expect("fresh registry accepts client metrics")
        .with_recorder(spans.clone());
    (observability, spans, registry)
}
