//! Retry middleware.
//!
//! Re-invokes the wrapped handler with the same call according to a backoff
//! schedule. Whether a failed attempt is retried is decided by an ordered
//! list of [`RetryFilter`]s: the first filter with an opinion wins and no
//! opinion at all means the outcome is returned as is. A done context always
//! stops retrying, whatever the filters say.

use std::sync::Arc;
use std::task::{Context, Poll};

use rpc_common::{RetryConfig, RetryPolicy};
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use crate::call::{Call, CallContext, Response};
use crate::classify::{ErrorClassification, classify_outcome};
use crate::error::RpcError;
use crate::middleware::CallFuture;

/// Verdict of a retry filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Make another attempt
    Retry,
    /// Return this outcome
    DoNotRetry,
}

/// Decides whether a failed attempt should be retried.
pub trait RetryFilter: Send + Sync {
    /// Return `None` to leave the decision to the next filter.
    fn decide(
        &self,
        context: &CallContext,
        classification: &ErrorClassification,
    ) -> Option<RetryDecision>;
}

/// Never retries once the caller's context is cancelled or timed out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextErrorFilter;

impl RetryFilter for ContextErrorFilter {
    fn decide(
        &self,
        context: &CallContext,
        classification: &ErrorClassification,
    ) -> Option<RetryDecision> {
        (context.is_done() || *classification == ErrorClassification::ContextCancelled)
            .then_some(RetryDecision::DoNotRetry)
    }
}

/// Follows the retryability hint carried by the error.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryableErrorFilter;

impl RetryFilter for RetryableErrorFilter {
    fn decide(
        &self,
        _context: &CallContext,
        classification: &ErrorClassification,
    ) -> Option<RetryDecision> {
        classification.retryable_hint().map(|retryable| {
            if retryable {
                RetryDecision::Retry
            } else {
                RetryDecision::DoNotRetry
            }
        })
    }
}

/// The default filters followed by `extra`.
pub fn with_default_retry_filters(
    extra: impl IntoIterator<Item = Arc<dyn RetryFilter>>,
) -> Vec<Arc<dyn RetryFilter>> {
    let mut filters: Vec<Arc<dyn RetryFilter>> =
        vec![Arc::new(RetryableErrorFilter), Arc::new(ContextErrorFilter)];
    filters.extend(extra);
    filters
}

fn should_retry(
    filters: &[Arc<dyn RetryFilter>],
    context: &CallContext,
    classification: &ErrorClassification,
) -> bool {
    if classification.is_success() || context.is_done() {
        return false;
    }
    filters
        .iter()
        .find_map(|filter| filter.decide(context, classification))
        == Some(RetryDecision::Retry)
}

/// Retry layer for Tower
#[derive(Clone)]
pub struct RetryLayer {
    policy: RetryPolicy,
    filters: Arc<[Arc<dyn RetryFilter>]>,
}

impl RetryLayer {
    /// Create a retry layer with the default filters.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self::with_filters(config, with_default_retry_filters(Vec::new()))
    }

    /// Create a retry layer with an explicit filter list.
    #[must_use]
    pub fn with_filters(config: RetryConfig, filters: Vec<Arc<dyn RetryFilter>>) -> Self {
        Self {
            policy: RetryPolicy::new(config),
            filters: filters.into(),
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
            filters: Arc::clone(&self.filters),
        }
    }
}

/// Retry service wrapper
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
    filters: Arc<[Arc<dyn RetryFilter>]>,
}

impl<S> Service<Call> for RetryService<S>
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
        let filters = Arc::clone(&self.filters);
        let policy = call
            .context
            .retry_override()
            .map_or_else(|| self.policy.clone(), |config| RetryPolicy::new(config.clone()));

        Box::pin(async move {
            let context = call.context.clone();
            let method = call.method.clone();
            policy
                .run(
                    move |_attempt| inner.clone().oneshot(call.clone()),
                    |outcome, attempts| {
                        let classification = classify_outcome(outcome);
                        let retry = should_retry(&filters, &context, &classification);
                        if retry {
                            debug!(
                                method = %method,
                                attempts,
                                kind = classification.kind().as_str(),
                                "retrying call"
                            );
                        }
                        retry
                    },
                    async {
                        context.done().await;
                    },
                )
                .await
        })
    }
}
