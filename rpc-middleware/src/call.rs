//! Call, context and response types flowing through a middleware chain.

use std::collections::BTreeMap;
use std::future::pending;
use std::time::Duration;

use bytes::Bytes;
use rpc_common::RetryConfig;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::warn;

use crate::error::RpcError;
use crate::trace::SpanContext;

/// Serialized request or result payload.
pub type Payload = Bytes;

/// Header map carried on a call or response.
pub type Headers = BTreeMap<String, String>;

/// Kind of call; `Oneway` calls carry no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallType {
    /// Request followed by a response
    #[default]
    Unary,
    /// Fire-and-forget request
    Oneway,
}

impl CallType {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::Oneway => "oneway",
        }
    }
}

/// Receiving side of a caller-controlled cancellation flag.
///
/// The default signal never fires.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// Whether cancellation has already been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve once cancellation is requested.
    ///
    /// Pends forever if the handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return pending().await;
        };
        let mut rx = rx.clone();
        let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !fired {
            pending::<()>().await;
        }
    }
}

/// Handle the caller keeps to cancel an in-flight call.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle and its paired signal.
    #[must_use]
    pub fn pair() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx: Some(rx) })
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Opaque edge request context blob forwarded between services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRequestContext(String);

impl EdgeRequestContext {
    /// Wrap a serialized edge context.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Serialized form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-call execution context.
///
/// Carries the optional deadline, the cancellation signal, outgoing headers,
/// the active span and the forwarded edge context.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancelSignal,
    /// Headers sent with the call
    pub headers: Headers,
    span: Option<SpanContext>,
    edge_context: Option<EdgeRequestContext>,
    retry_override: Option<RetryConfig>,
}

impl CallContext {
    /// Create an empty context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context together with the handle that cancels it.
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let (handle, signal) = CancelHandle::pair();
        (Self::default().with_cancel(signal), handle)
    }

    /// Set an absolute deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a cancellation signal.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach an edge request context.
    #[must_use]
    pub fn with_edge_context(mut self, edge: EdgeRequestContext) -> Self {
        self.edge_context = Some(edge);
        self
    }

    /// Override the retry schedule for this call only.
    #[must_use]
    pub fn with_retry_override(mut self, config: RetryConfig) -> Self {
        self.retry_override = Some(config);
        self
    }

    /// Absolute deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Shorten the deadline to `deadline` if it is earlier than the current one.
    pub fn tighten_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
    }

    /// Time left before the deadline, saturating at zero.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The error the call should end with if the context is already done.
    #[must_use]
    pub fn done_error(&self) -> Option<RpcError> {
        if self.cancel.is_cancelled() {
            return Some(RpcError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(RpcError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done_error().is_some()
    }

    /// Resolve when the context becomes done, yielding the matching error.
    pub async fn done(&self) -> RpcError {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => RpcError::Cancelled,
            () = deadline => RpcError::DeadlineExceeded,
        }
    }

    /// Span that is currently active for this call.
    #[must_use]
    pub const fn span(&self) -> Option<&SpanContext> {
        self.span.as_ref()
    }

    /// Replace the active span.
    pub fn set_span(&mut self, span: SpanContext) {
        self.span = Some(span);
    }

    /// Forwarded edge context.
    #[must_use]
    pub const fn edge_context(&self) -> Option<&EdgeRequestContext> {
        self.edge_context.as_ref()
    }

    /// Replace the forwarded edge context.
    pub fn set_edge_context(&mut self, edge: EdgeRequestContext) {
        self.edge_context = Some(edge);
    }

    /// Per-call retry schedule override.
    #[must_use]
    pub const fn retry_override(&self) -> Option<&RetryConfig> {
        self.retry_override.as_ref()
    }
}

/// An outgoing call.
#[derive(Debug, Clone)]
pub struct Call {
    /// Method name, e.g. `GetUser`
    pub method: String,
    /// Unary or oneway
    pub call_type: CallType,
    /// Serialized request
    pub request: Payload,
    /// Execution context
    pub context: CallContext,
}

impl Call {
    /// Create a unary call with an empty context.
    #[must_use]
    pub fn new(method: impl Into<String>, request: impl Into<Payload>) -> Self {
        Self {
            method: method.into(),
            call_type: CallType::Unary,
            request: request.into(),
            context: CallContext::default(),
        }
    }

    /// Use the given context.
    #[must_use]
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// Mark the call as oneway.
    #[must_use]
    pub const fn oneway(mut self) -> Self {
        self.call_type = CallType::Oneway;
        self
    }
}

/// Exception declared in a service's interface contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredException {
    /// Declared type name, e.g. `UserNotFound`
    pub type_name: String,
    /// Result slot the exception arrived in
    pub slot: i16,
    /// Human-readable message
    pub message: String,
    /// Status code, when the exception is a status-bearing application error
    pub code: Option<i32>,
    /// Retryability hint carried by the exception
    pub retryable: Option<bool>,
}

impl DeclaredException {
    /// Create an exception in slot 1 with no code or hint.
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            slot: 1,
            message: message.into(),
            code: None,
            retryable: None,
        }
    }

    /// Set the result slot.
    #[must_use]
    pub const fn with_slot(mut self, slot: i16) -> Self {
        self.slot = slot;
        self
    }

    /// Attach a status code.
    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a retryability hint.
    #[must_use]
    pub const fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

/// Decoded result of a call: a success payload or one declared exception.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultBody {
    /// Successful result
    Success(Payload),
    /// The populated exception slot
    Exception(DeclaredException),
}

impl ResultBody {
    /// Build a body from decoded result slots.
    ///
    /// The first populated exception slot wins; further populated slots are
    /// logged and dropped. With no exception the success payload is used,
    /// empty for void methods.
    pub fn from_slots(
        success: Option<Payload>,
        exceptions: impl IntoIterator<Item = Option<DeclaredException>>,
    ) -> Self {
        let mut populated = exceptions.into_iter().flatten();
        let Some(first) = populated.next() else {
            return Self::Success(success.unwrap_or_default());
        };
        for extra in populated {
            warn!(
                kept = %first.type_name,
                dropped = %extra.type_name,
                slot = extra.slot,
                "multiple exception slots populated"
            );
        }
        Self::Exception(first)
    }

    /// The declared exception, if any.
    #[must_use]
    pub const fn exception(&self) -> Option<&DeclaredException> {
        match self {
            Self::Exception(exc) => Some(exc),
            Self::Success(_) => None,
        }
    }
}

/// Response headers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseMeta {
    /// Headers returned by the remote side
    pub headers: Headers,
}

/// Response to a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Response metadata
    pub meta: ResponseMeta,
    /// Decoded result
    pub body: ResultBody,
}

impl Response {
    /// Successful response carrying `payload`.
    #[must_use]
    pub fn success(payload: impl Into<Payload>) -> Self {
        Self {
            meta: ResponseMeta::default(),
            body: ResultBody::Success(payload.into()),
        }
    }

    /// Response carrying a declared exception.
    #[must_use]
    pub fn exception(exception: DeclaredException) -> Self {
        Self {
            meta: ResponseMeta::default(),
            body: ResultBody::Exception(exception),
        }
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.headers.insert(key.into(), value.into());
        self
    }
}
