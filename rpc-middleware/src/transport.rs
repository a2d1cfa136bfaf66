//! Terminal transport seam.
//!
//! A [`Transport`] performs the actual network exchange. Wire encoding and
//! connection management live behind this trait; the middleware chain only
//! sees [`Call`]s and [`Response`]s.

use std::sync::Arc;

use async_trait::async_trait;

use crate::call::{Call, Response};
use crate::error::RpcError;
use crate::middleware::{CallHandler, handler_fn};

/// Sends a call and waits for its response.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform one exchange with the remote side.
    async fn send(&self, call: Call) -> Result<Response, RpcError>;
}

/// Wrap a transport as the innermost handler of a chain.
///
/// The send is raced against the call context, so a cancelled or expired
/// call returns immediately even if the transport does not watch the
/// context itself.
pub fn transport_handler(transport: Arc<dyn Transport>) -> CallHandler {
    handler_fn(move |call: Call| {
        let transport = Arc::clone(&transport);
        async move {
            let context = call.context.clone();
            tokio::select! {
                biased;
                err = context.done() => Err(err),
                outcome = transport.send(call) => outcome,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallContext;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Echo {
        delay: Duration,
    }

    #[async_trait]
    impl Transport for Echo {
        async fn send(&self, call: Call) -> Result<Response, RpcError> {
            tokio::time::sleep(self.delay).await;
            Ok(Response::success(call.request))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_returns_response() {
        let handler = transport_handler(Arc::new(Echo {
            delay: Duration::from_millis(5),
        }));
        let response = handler.oneshot(Call::new("Echo", "hello")).await.unwrap();
        assert_eq!(response, Response::success("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_send() {
        let handler = transport_handler(Arc::new(Echo {
            delay: Duration::from_secs(10),
        }));
        let ctx = CallContext::new().with_timeout(Duration::from_millis(100));
        let err = handler
            .oneshot(Call::new("Echo", "").with_context(ctx))
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_send() {
        let handler = transport_handler(Arc::new(Echo {
            delay: Duration::from_secs(10),
        }));
        let (ctx, cancel) = CallContext::cancellable();
        let task = tokio::spawn(handler.oneshot(Call::new("Echo", "").with_context(ctx)));
        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap_err(), RpcError::Cancelled);
    }
}
