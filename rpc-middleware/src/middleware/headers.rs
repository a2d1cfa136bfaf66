//! Outgoing header middlewares: edge context forwarding and client name.

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};

use crate::call::{Call, CallContext, EdgeRequestContext, Response};
use crate::error::RpcError;
use crate::headers::{EDGE_REQUEST, USER_AGENT};
use crate::middleware::CallFuture;

/// Serializes the edge request context to and from its header value.
pub trait EdgeContextCodec: Send + Sync + 'static {
    /// Header value for the context's edge request, if any.
    fn encode(&self, context: &CallContext) -> Option<String>;

    /// Parse a received header value.
    fn decode(&self, header: &str) -> Option<EdgeRequestContext>;
}

/// Forwards the edge context blob unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEdgeContext;

impl EdgeContextCodec for PassthroughEdgeContext {
    fn encode(&self, context: &CallContext) -> Option<String> {
        context
            .edge_context()
            .map(|edge| edge.as_str().to_string())
    }

    fn decode(&self, header: &str) -> Option<EdgeRequestContext> {
        (!header.is_empty()).then(|| EdgeRequestContext::new(header))
    }
}

/// Edge context forwarding layer for Tower
#[derive(Clone)]
pub struct ForwardEdgeContextLayer {
    codec: Arc<dyn EdgeContextCodec>,
}

impl ForwardEdgeContextLayer {
    /// Forward using `codec`.
    pub fn new(codec: Arc<dyn EdgeContextCodec>) -> Self {
        Self { codec }
    }
}

impl Default for ForwardEdgeContextLayer {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughEdgeContext))
    }
}

impl<S> Layer<S> for ForwardEdgeContextLayer {
    type Service = ForwardEdgeContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForwardEdgeContextService {
            inner,
            codec: Arc::clone(&self.codec),
        }
    }
}

/// Edge context forwarding service wrapper
#[derive(Clone)]
pub struct ForwardEdgeContextService<S> {
    inner: S,
    codec: Arc<dyn EdgeContextCodec>,
}

impl<S> Service<Call> for ForwardEdgeContextService<S>
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
        if let Some(header) = self.codec.encode(&call.context) {
            call.context.headers.insert(EDGE_REQUEST.to_string(), header);
        }
        Box::pin(self.inner.clone().oneshot(call))
    }
}

/// Client name layer for Tower
///
/// Sets `User-Agent` to the configured client name. An empty name removes
/// the header instead of sending it blank.
#[derive(Debug, Clone)]
pub struct ClientNameLayer {
    name: Arc<str>,
}

impl ClientNameLayer {
    /// Identify calls as `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }
}

impl<S> Layer<S> for ClientNameLayer {
    type Service = ClientNameService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientNameService {
            inner,
            name: Arc::clone(&self.name),
        }
    }
}

/// Client name service wrapper
#[derive(Debug, Clone)]
pub struct ClientNameService<S> {
    inner: S,
    name: Arc<str>,
}

impl<S> Service<Call> for ClientNameService<S>
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
        if self.name.is_empty() {
            call.context.headers.remove(USER_AGENT);
        } else {
            call.context
                .headers
                .insert(USER_AGENT.to_string(), self.name.to_string());
        }
        Box::pin(self.inner.clone().oneshot(call))
    }
}
