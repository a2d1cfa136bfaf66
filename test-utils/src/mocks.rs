//! Mock implementations for testing.
//!
//! [`MockTransport`] plays back scripted outcomes and records every call it
//! receives; [`InMemorySpanRecorder`] keeps finished spans for assertions.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rpc_middleware::{Call, FinishedSpan, Headers, Response, RpcError, SpanRecorder, Transport};

type Outcome = Result<Response, RpcError>;

/// Transport returning scripted outcomes.
///
/// Scripted outcomes are consumed in order; once the script is exhausted the
/// fallback outcome is returned for every call. The default fallback is an
/// empty success.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Option<Outcome>>,
    calls: Mutex<Vec<Call>>,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Create a transport that always succeeds with an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that returns `outcome` for every call.
    #[must_use]
    pub fn always(outcome: Outcome) -> Self {
        let transport = Self::default();
        *transport.fallback.lock() = Some(outcome);
        transport
    }

    /// Create a transport that plays back `outcomes` before falling back.
    #[must_use]
    pub fn scripted(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let transport = Self::default();
        transport.script.lock().extend(outcomes);
        transport
    }

    /// Delay every response by `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// All calls received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Headers of the most recent call.
    #[must_use]
    pub fn last_headers(&self) -> Option<Headers> {
        self.calls
            .lock()
            .last()
            .map(|call| call.context.headers.clone())
    }

    fn next_outcome(&self) -> Outcome {
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| {
            self.fallback
                .lock()
                .clone()
                .unwrap_or_else(|| Ok(Response::success(Bytes::new())))
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, call: Call) -> Result<Response, RpcError> {
        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_outcome()
    }
}

/// Span recorder keeping finished spans in memory.
#[derive(Debug, Default)]
pub struct InMemorySpanRecorder {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemorySpanRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All finished spans, in finishing order.
    #[must_use]
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans.lock().clone()
    }

    /// Finished spans with the given name.
    #[must_use]
    pub fn named(&self, name: &str) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    /// Forget all recorded spans.
    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl SpanRecorder for InMemorySpanRecorder {
    fn record(&self, span: FinishedSpan) {
        self.spans.lock().push(span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let transport = MockTransport::scripted([Err(RpcError::transport("reset"))]);
        assert!(transport.send(Call::new("Ping", "")).await.is_err());
        assert!(transport.send(Call::new("Ping", "")).await.is_ok());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_always() {
        let transport = MockTransport::always(Err(RpcError::Cancelled));
        for _ in 0..3 {
            assert_eq!(
                transport.send(Call::new("Ping", "")).await,
                Err(RpcError::Cancelled)
            );
        }
    }

    #[test]
    fn test_recorder_filters_by_name() {
        let recorder = InMemorySpanRecorder::new();
        for name in ["a", "b", "a"] {
            let span = rpc_middleware::trace::Span::start(name, rpc_middleware::SpanKind::Client, None);
            recorder.record(span.finish(rpc_middleware::trace::SpanStatus::Ok));
        }
        assert_eq!(recorder.named("a").len(), 2);
        recorder.clear();
        assert!(recorder.spans().is_empty());
    }
}
