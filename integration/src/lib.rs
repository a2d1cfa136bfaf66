//! Harness for end-to-end tests of client and server chains.
//!
//! [`LoopbackTransport`] connects a client chain to a server chain inside one
//! process. Only what crosses the wire is carried over: method, call type,
//! request payload and headers. The server side starts from a fresh context
//! and rebuilds deadline, edge context and trace parent from the headers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rpc_middleware::{Call, CallContext, CallHandler, Response, RpcError, Transport};
use tower::ServiceExt;

/// Transport delivering calls to an in-process server handler.
pub struct LoopbackTransport {
    server: Mutex<CallHandler>,
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport").finish_non_exhaustive()
    }
}

impl LoopbackTransport {
    /// Deliver calls to `server`.
    #[must_use]
    pub fn new(server: CallHandler) -> Self {
        Self {
            server: Mutex::new(server),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, call: Call) -> Result<Response, RpcError> {
        let mut context = CallContext::new();
        context.headers = call.context.headers;
        let incoming = Call {
            method: call.method,
            call_type: call.call_type,
            request: call.request,
            context,
        };

        let server = self.server.lock().clone();
        server.oneshot(incoming).await
    }
}
