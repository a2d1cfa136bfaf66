//! Tower middleware operating on [`Call`]s.
//!
//! Every layer here is generic over the wrapped service and also usable as a
//! [`Middleware`] trait object, which is how [`crate::chain`] composes them.

use std::future::Future;

use futures::future::BoxFuture;
use tower::util::BoxCloneService;
use tower::{Layer, Service};

use crate::call::{Call, Response};
use crate::error::RpcError;

pub mod breaker;
pub mod deadline;
pub mod errors;
pub mod headers;
pub mod metrics;
pub mod retry;
pub mod server;
pub mod span;
pub mod stack;

pub use breaker::BreakerLayer;
pub use deadline::{DeadlineBudgetLayer, budget_millis};
pub use errors::ApplicationErrorLayer;
pub use headers::{
    ClientNameLayer, EdgeContextCodec, ForwardEdgeContextLayer, PassthroughEdgeContext,
};
pub use metrics::MetricsLayer;
pub use retry::{
    ContextErrorFilter, RetryDecision, RetryFilter, RetryLayer, RetryableErrorFilter,
    with_default_retry_filters,
};
pub use server::{
    Inject, InjectEdgeContextLayer, InjectService, InjectTraceContextLayer, ReadDeadlineBudgetLayer,
};
pub use span::SpanLayer;

/// Type-erased handler for calls.
pub type CallHandler = BoxCloneService<Call, Response, RpcError>;

/// Future returned by every middleware service.
pub type CallFuture = BoxFuture<'static, Result<Response, RpcError>>;

/// Wraps one handler into another.
pub trait Middleware: Send + Sync {
    /// Wrap `next`, returning the handler that runs this middleware first.
    fn wrap(&self, next: CallHandler) -> CallHandler;
}

impl<L> Middleware for L
where
    L: Layer<CallHandler> + Send + Sync,
    L::Service: Service<Call, Response = Response, Error = RpcError> + Clone + Send + 'static,
    <L::Service as Service<Call>>::Future: Send + 'static,
{
    fn wrap(&self, next: CallHandler) -> CallHandler {
        BoxCloneService::new(self.layer(next))
    }
}

/// Turn an async function into a terminal [`CallHandler`].
pub fn handler_fn<F, Fut>(f: F) -> CallHandler
where
    F: Fn(Call) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Response, RpcError>> + Send + 'static,
{
    BoxCloneService::new(tower::service_fn(f))
}
