//! Circuit breaker middleware.
//!
//! Rejects calls with [`RpcError::CircuitOpen`] while the breaker is open
//! and reports every completed call to it. Transport and application errors
//! count as failures, declared exceptions as healthy responses. A cancelled
//! context is not reported.

use std::sync::Arc;
use std::task::{Context, Poll};

use rpc_common::{BreakerConfig, FailureRatioBreaker};
use tower::{Layer, Service, ServiceExt};
use tracing::warn;

use crate::call::{Call, Response};
use crate::classify::classify_outcome;
use crate::error::RpcError;
use crate::middleware::CallFuture;

/// Circuit breaker layer for Tower
#[derive(Debug, Clone)]
pub struct BreakerLayer {
    breaker: Arc<FailureRatioBreaker>,
}

impl BreakerLayer {
    /// Create a layer with its own breaker.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self::shared(Arc::new(FailureRatioBreaker::new(config)))
    }

    /// Create a layer around an existing breaker.
    #[must_use]
    pub const fn shared(breaker: Arc<FailureRatioBreaker>) -> Self {
        Self { breaker }
    }

    /// The breaker guarding the wrapped handler.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<FailureRatioBreaker> {
        &self.breaker
    }
}

impl<S> Layer<S> for BreakerLayer {
    type Service = BreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BreakerService {
            inner,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

/// Circuit breaker service wrapper
#[derive(Debug, Clone)]
pub struct BreakerService<S> {
    inner: S,
    breaker: Arc<FailureRatioBreaker>,
}

impl<S> Service<Call> for BreakerService<S>
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
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(retry_after) => {
                warn!(
                    breaker = self.breaker.name(),
                    method = %call.method,
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "circuit open, rejecting call"
                );
                let err = RpcError::circuit_open(self.breaker.name(), retry_after);
                return Box::pin(futures::future::ready(Err(err)));
            }
        };

        let inner = self.inner.clone();
        Box::pin(async move {
            let outcome = inner.oneshot(call).await;
            match classify_outcome(&outcome).breaker_outcome() {
                Some(success) => permit.record(success),
                None => permit.release(),
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::DeclaredException;
    use crate::middleware::handler_fn;
    use rpc_common::CircuitState;
    use std::time::Duration;

    fn config() -> BreakerConfig {
        BreakerConfig::named("profile")
            .with_threshold(0.5)
            .with_min_requests(4)
            .with_open_timeout(Duration::from_secs(5))
    }

    fn failing() -> crate::middleware::CallHandler {
        handler_fn(|_call: Call| async { Err(RpcError::transport("reset")) })
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_failure_ratio() {
        let layer = BreakerLayer::new(config());
        let svc = layer.layer(failing());

        for _ in 0..4 {
            let err = svc.clone().oneshot(Call::new("Get", "")).await.unwrap_err();
            assert_eq!(err, RpcError::transport("reset"));
        }
        assert_eq!(layer.breaker().state(), CircuitState::Open);

        let err = svc.oneshot(Call::new("Get", "")).await.unwrap_err();
        assert!(matches!(err, RpcError::CircuitOpen { ref service, .. } if service == "profile"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_declared_exceptions_keep_circuit_closed() {
        let layer = BreakerLayer::new(config());
        let svc = layer.layer(handler_fn(|_call: Call| async {
            Ok(Response::exception(DeclaredException::new("NotFound", "x")))
        }));

        for _ in 0..10 {
            svc.clone().oneshot(Call::new("Get", "")).await.unwrap();
        }
        assert_eq!(layer.breaker().state(), CircuitState::Closed);
        assert_eq!(layer.breaker().counts().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_calls_are_not_failures() {
        let layer = BreakerLayer::new(config());
        let svc = layer.layer(handler_fn(|_call: Call| async { Err(RpcError::Cancelled) }));

        for _ in 0..10 {
            svc.clone().oneshot(Call::new("Get", "")).await.unwrap_err();
        }
        assert_eq!(layer.breaker().state(), CircuitState::Closed);
        assert_eq!(layer.breaker().counts().requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout() {
        let layer = BreakerLayer::new(config());
        let svc = layer.layer(failing());
        for _ in 0..4 {
            svc.clone().oneshot(Call::new("Get", "")).await.unwrap_err();
        }
        assert_eq!(layer.breaker().state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(layer.breaker().state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_call_does_not_wedge_half_open() {
        let layer = BreakerLayer::new(config().with_max_trial_requests(1));
        for _ in 0..4 {
            layer
                .layer(failing())
                .oneshot(Call::new("Get", ""))
                .await
                .unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(layer.breaker().state(), CircuitState::HalfOpen);

        let slow = layer.layer(handler_fn(|_call: Call| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Response::success(""))
        }));
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), slow.oneshot(Call::new("Get", "")))
                .await;
        assert!(abandoned.is_err());
        assert_eq!(layer.breaker().counts().requests, 0);

        let healthy = layer.layer(handler_fn(|_call: Call| async { Ok(Response::success("")) }));
        healthy.oneshot(Call::new("Get", "")).await.unwrap();
        assert_eq!(layer.breaker().state(), CircuitState::Closed);
    }
}
