//! Translation of raw remote status failures into application errors.

use std::task::{Context, Poll};

use futures::TryFutureExt;
use tower::{Layer, Service, ServiceExt};

use crate::call::{Call, Response};
use crate::error::RpcError;
use crate::middleware::CallFuture;
use crate::status::status_retryable;

/// Convert [`RpcError::Remote`] into [`RpcError::Application`], attaching the
/// code's retryability. Other outcomes pass through.
#[must_use]
pub fn translate(err: RpcError) -> RpcError {
    match err {
        RpcError::Remote { code, message } => RpcError::Application {
            code,
            message,
            retryable: status_retryable(code),
        },
        other => other,
    }
}

/// Application error layer for Tower
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationErrorLayer;

impl ApplicationErrorLayer {
    /// Create the layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ApplicationErrorLayer {
    type Service = ApplicationErrorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApplicationErrorService { inner }
    }
}

/// Application error service wrapper
#[derive(Debug, Clone)]
pub struct ApplicationErrorService<S> {
    inner: S,
}

impl<S> Service<Call> for ApplicationErrorService<S>
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
        Box::pin(self.inner.clone().oneshot(call).map_err(translate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;

    #[tokio::test]
    async fn test_remote_error_translated() {
        let svc = ApplicationErrorLayer::new()
            .layer(handler_fn(|_call: Call| async { Err(RpcError::remote(503, "overloaded")) }));

        let err = svc.oneshot(Call::new("Ping", "")).await.unwrap_err();
        assert_eq!(
            err,
            RpcError::Application {
                code: 503,
                message: "overloaded".to_string(),
                retryable: Some(true),
            }
        );
    }

    #[test]
    fn test_other_errors_untouched() {
        assert_eq!(translate(RpcError::Cancelled), RpcError::Cancelled);
        assert_eq!(
            translate(RpcError::transport("reset")),
            RpcError::transport("reset")
        );
    }

    #[test]
    fn test_unknown_code_has_no_hint() {
        assert!(matches!(
            translate(RpcError::remote(299, "odd")),
            RpcError::Application { retryable: None, .. }
        ));
    }
}
