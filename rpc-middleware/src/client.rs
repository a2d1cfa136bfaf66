//! Client facade over a built chain.

use std::sync::Arc;

use parking_lot::Mutex;
use tower::ServiceExt;

use crate::call::{Call, CallContext, Payload, Response, ResultBody};
use crate::chain::build;
use crate::config::ClientConfig;
use crate::error::RpcError;
use crate::middleware::CallHandler;
use crate::middleware::stack::{Observability, default_client_middlewares};
use crate::transport::{Transport, transport_handler};

/// Issues calls through a middleware chain.
///
/// Cheap to clone and safe to share between tasks.
#[derive(Clone)]
pub struct Client {
    handler: Arc<Mutex<CallHandler>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Use an already built handler.
    #[must_use]
    pub fn new(handler: CallHandler) -> Self {
        Self {
            handler: Arc::new(Mutex::new(handler)),
        }
    }

    /// Build the default client chain around `transport`.
    #[must_use]
    pub fn from_transport(
        config: &ClientConfig,
        observability: &Observability,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let middlewares = default_client_middlewares(config, observability);
        Self::new(build(&middlewares, transport_handler(transport)))
    }

    /// Run `call` through the chain and return the raw response.
    ///
    /// Declared exceptions arrive as [`ResultBody::Exception`].
    pub async fn call_raw(&self, call: Call) -> Result<Response, RpcError> {
        let handler = self.handler.lock().clone();
        handler.oneshot(call).await
    }

    /// Call `method` and return the success payload.
    ///
    /// A declared exception is returned as [`RpcError::Declared`].
    pub async fn call(
        &self,
        context: CallContext,
        method: &str,
        request: impl Into<Payload>,
    ) -> Result<Payload, RpcError> {
        let call = Call::new(method, request).with_context(context);
        match self.call_raw(call).await?.body {
            ResultBody::Success(payload) => Ok(payload),
            ResultBody::Exception(exc) => Err(RpcError::Declared(exc)),
        }
    }

    /// Send a oneway call; only transport-level failures are reported.
    pub async fn send_oneway(
        &self,
        context: CallContext,
        method: &str,
        request: impl Into<Payload>,
    ) -> Result<(), RpcError> {
        let call = Call::new(method, request).with_context(context).oneway();
        self.call_raw(call).await.map(|_| ())
    }
}
