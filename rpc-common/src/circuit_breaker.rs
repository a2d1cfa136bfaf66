//! Failure-ratio circuit breaker.
//!
//! This module provides a circuit breaker that trips on the ratio of failed
//! requests inside a rolling window, rather than on consecutive failures, so
//! a trickle of errors in a high-volume client does not open the circuit.
//!
//! All state lives behind one lock per breaker. The lock is never held
//! across an await point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::BreakerError;
use crate::metrics::BreakerMetrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, limited trial requests are allowed
    HalfOpen,
}

impl CircuitState {
    /// Label value used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Name for metrics and logging
    pub name: String,
    /// Failure ratio in `(0, 1]` at which the circuit opens
    pub threshold: f64,
    /// Minimum requests inside the window before the ratio is considered
    pub min_requests: u32,
    /// Rolling window after which closed-state counts are cleared
    pub window: Duration,
    /// Time to stay open before letting trial requests through
    pub open_timeout: Duration,
    /// Trial requests allowed while half-open; that many successes close it
    pub max_trial_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            threshold: 0.5,
            min_requests: 20,
            window: Duration::from_secs(10),
            open_timeout: Duration::from_secs(30),
            max_trial_requests: 3,
        }
    }
}

impl BreakerConfig {
    /// Create a config with the given breaker name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the failure ratio threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the minimum number of requests before tripping.
    #[must_use]
    pub const fn with_min_requests(mut self, min_requests: u32) -> Self {
        self.min_requests = min_requests;
        self
    }

    /// Set the rolling window.
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the open timeout.
    #[must_use]
    pub const fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the number of half-open trial requests.
    #[must_use]
    pub const fn with_max_trial_requests(mut self, max: u32) -> Self {
        self.max_trial_requests = max;
        self
    }
}

/// Request counts for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Requests admitted
    pub requests: u32,
    /// Requests recorded as successful
    pub successes: u32,
    /// Requests recorded as failed
    pub failures: u32,
    /// Successes since the last failure
    pub consecutive_successes: u32,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    counts: Counts,
    generation: u64,
    expiry: Option<Instant>,
}

/// Circuit breaker tripping on the failure ratio of a rolling window.
///
/// States:
/// - Closed: requests flow; counts reset every `window`
/// - Open: requests are rejected until `open_timeout` elapses
/// - Half-Open: up to `max_trial_requests` are admitted to test recovery
#[derive(Debug)]
pub struct FailureRatioBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    metrics: Option<Arc<BreakerMetrics>>,
}

impl FailureRatioBreaker {
    /// Create a new breaker with the given configuration.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        let now = Instant::now();
        let expiry = (!config.window.is_zero()).then(|| now + config.window);
        Self {
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                counts: Counts::default(),
                generation: 0,
                expiry,
            }),
            metrics: None,
        }
    }

    /// Attach state-transition metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<BreakerMetrics>) -> Self {
        metrics.set_state(&self.config.name, CircuitState::Closed);
        self.metrics = Some(metrics);
        self
    }

    /// Breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state, after applying any time-based transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.refresh(&mut state, Instant::now());
        state.state
    }

    /// Snapshot of the counts for the current generation.
    #[must_use]
    pub fn counts(&self) -> Counts {
        let mut state = self.state.lock();
        self.refresh(&mut state, Instant::now());
        state.counts
    }

    /// Ask to admit one request.
    ///
    /// Returns a permit that must be resolved with the request's result, or
    /// the time until the breaker will consider trial requests again.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, Duration> {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.refresh(&mut state, now);

        match state.state {
            CircuitState::Open => {
                let retry_after = state
                    .expiry
                    .map_or(Duration::ZERO, |expiry| expiry.saturating_duration_since(now));
                return Err(retry_after);
            }
            CircuitState::HalfOpen if state.counts.requests >= self.config.max_trial_requests => {
                return Err(Duration::ZERO);
            }
            _ => {}
        }

        state.counts.requests += 1;
        Ok(BreakerPermit {
            breaker: Some(Arc::clone(self)),
            generation: state.generation,
        })
    }

    /// Run `operation` under breaker protection, counting any `Err` as a failure.
    pub async fn execute<T, E, Fut>(self: &Arc<Self>, operation: Fut) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire().map_err(|retry_after| BreakerError::Open {
            breaker: self.config.name.clone(),
            retry_after,
        })?;

        match operation.await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(err) => {
                permit.record_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Reset the breaker to a fresh closed state.
    pub fn reset(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.transition(&mut state, CircuitState::Closed, now);
        self.new_generation(&mut state, now);
    }

    fn record(&self, generation: u64, success: bool) {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.refresh(&mut state, now);
        // Results from a previous generation no longer describe this circuit.
        if state.generation != generation {
            return;
        }

        if success {
            state.counts.successes += 1;
            state.counts.consecutive_successes += 1;
            state.counts.consecutive_failures = 0;
            if state.state == CircuitState::HalfOpen
                && state.counts.consecutive_successes >= self.config.max_trial_requests
            {
                self.transition(&mut state, CircuitState::Closed, now);
            }
        } else {
            state.counts.failures += 1;
            state.counts.consecutive_failures += 1;
            state.counts.consecutive_successes = 0;
            match state.state {
                CircuitState::Closed if self.ready_to_trip(&state.counts) => {
                    self.transition(&mut state, CircuitState::Open, now);
                }
                CircuitState::HalfOpen => {
                    self.transition(&mut state, CircuitState::Open, now);
                }
                _ => {}
            }
        }
    }

    fn release(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.counts.requests = state.counts.requests.saturating_sub(1);
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        if counts.requests == 0 || counts.requests < self.config.min_requests {
            return false;
        }
        f64::from(counts.failures) / f64::from(counts.requests) >= self.config.threshold
    }

    fn refresh(&self, state: &mut BreakerState, now: Instant) {
        match (state.state, state.expiry) {
            (CircuitState::Closed, Some(expiry)) if expiry <= now => {
                self.new_generation(state, now);
            }
            (CircuitState::Open, Some(expiry)) if expiry <= now => {
                self.transition(state, CircuitState::HalfOpen, now);
            }
            _ => {}
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = state.state;
        if from == to {
            return;
        }
        state.state = to;
        self.new_generation(state, now);

        match to {
            CircuitState::Open => warn!(
                breaker = %self.config.name,
                from = from.as_str(),
                "Circuit opened"
            ),
            _ => info!(
                breaker = %self.config.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit state changed"
            ),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(&self.config.name, from, to);
        }
    }

    fn new_generation(&self, state: &mut BreakerState, now: Instant) {
        state.generation += 1;
        state.counts = Counts::default();
        state.expiry = match state.state {
            CircuitState::Closed => (!self.config.window.is_zero()).then(|| now + self.config.window),
            CircuitState::Open => Some(now + self.config.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }
}

/// Admission granted by [`FailureRatioBreaker::try_acquire`].
///
/// Resolved at most once. A permit dropped unresolved, for example when the
/// call future is abandoned, is released.
#[must_use = "a permit must be resolved with the request result"]
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Option<Arc<FailureRatioBreaker>>,
    generation: u64,
}

impl BreakerPermit {
    /// Record the admitted request as successful.
    pub fn record_success(self) {
        self.record(true);
    }

    /// Record the admitted request as failed.
    pub fn record_failure(self) {
        self.record(false);
    }

    /// Record the request result from a success flag.
    pub fn record(mut self, success: bool) {
        if let Some(breaker) = self.breaker.take() {
            breaker.record(self.generation, success);
        }
    }

    /// Give the admission back without a result.
    pub fn release(mut self) {
        if let Some(breaker) = self.breaker.take() {
            breaker.release(self.generation);
        }
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if let Some(breaker) = self.breaker.take() {
            breaker.release(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(config: BreakerConfig) -> Arc<FailureRatioBreaker> {
        Arc::new(FailureRatioBreaker::new(config))
    }

    fn fail(cb: &Arc<FailureRatioBreaker>, n: u32) {
        for _ in 0..n {
            cb.try_acquire().unwrap().record_failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_closed() {
        let cb = breaker(BreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_when_ratio_reached() {
        let cb = breaker(
            BreakerConfig::named("profile")
                .with_min_requests(4)
                .with_threshold(0.5),
        );

        cb.try_acquire().unwrap().record_success();
        cb.try_acquire().unwrap().record_success();
        fail(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_requests_guard() {
        let cb = breaker(BreakerConfig::default().with_min_requests(10));
        fail(&cb, 9);
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_clears_counts() {
        let cb = breaker(
            BreakerConfig::default()
                .with_min_requests(3)
                .with_window(Duration::from_secs(1)),
        );
        fail(&cb, 2);
        tokio::time::advance(Duration::from_secs(2)).await;
        fail(&cb, 1);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_and_close() {
        let cb = breaker(
            BreakerConfig::default()
                .with_min_requests(1)
                .with_open_timeout(Duration::from_secs(5))
                .with_max_trial_requests(2),
        );
        fail(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let first = cb.try_acquire().unwrap();
        let second = cb.try_acquire().unwrap();
        assert!(cb.try_acquire().is_err(), "only two trial requests allowed");

        first.record_success();
        second.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(
            BreakerConfig::default()
                .with_min_requests(1)
                .with_open_timeout(Duration::from_secs(5)),
        );
        fail(&cb, 1);
        tokio::time::advance(Duration::from_secs(6)).await;

        fail(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_permit_ignored() {
        let cb = breaker(BreakerConfig::default().with_min_requests(1));
        let stale = cb.try_acquire().unwrap();
        fail(&cb, 1);
        assert_eq!(cb.state(), CircuitState::Open);

        stale.record_success();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_permit_is_not_counted() {
        let cb = breaker(BreakerConfig::default().with_min_requests(1));
        cb.try_acquire().unwrap().release();
        assert_eq!(cb.counts().requests, 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_permit_frees_its_slot() {
        let cb = breaker(
            BreakerConfig::default()
                .with_min_requests(1)
                .with_open_timeout(Duration::from_secs(5))
                .with_max_trial_requests(1),
        );
        fail(&cb, 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.counts().requests, 0);

        cb.try_acquire().unwrap().record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_does_not_dilute_ratio() {
        let cb = breaker(
            BreakerConfig::default()
                .with_min_requests(2)
                .with_threshold(1.0),
        );
        for _ in 0..5 {
            drop(cb.try_acquire().unwrap());
        }
        fail(&cb, 2);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_keep_counts_consistent() {
        let cb = breaker(
            BreakerConfig::default()
                .with_min_requests(u32::MAX)
                .with_window(Duration::from_secs(3600)),
        );

        let tasks: Vec<_> = (0..8)
            .map(|task| {
                let cb = Arc::clone(&cb);
                tokio::spawn(async move {
                    for i in 0..100 {
                        let permit = cb.try_acquire().unwrap();
                        tokio::task::yield_now().await;
                        permit.record((task + i) % 2 == 0);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let counts = cb.counts();
        assert_eq!(counts.requests, 800);
        assert_eq!(counts.successes, 400);
        assert_eq!(counts.failures, 400);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_limited_concurrent_trials() {
        let cb = breaker(
            BreakerConfig::default()
                .with_min_requests(1)
                .with_open_timeout(Duration::from_secs(5))
                .with_max_trial_requests(3),
        );
        fail(&cb, 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let admitted = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cb = Arc::clone(&cb);
                let admitted = Arc::clone(&admitted);
                tokio::spawn(async move {
                    if let Ok(permit) = cb.try_acquire() {
                        admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        permit.record_success();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(admitted.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_execute_rejects_when_open() {
        let cb = breaker(BreakerConfig::named("profile").with_min_requests(1));
        let result: Result<(), BreakerError<&str>> =
            tokio_test::block_on(cb.execute(async { Err("boom") }));
        assert!(matches!(result, Err(BreakerError::Inner("boom"))));

        let result: Result<(), BreakerError<&str>> =
            tokio_test::block_on(cb.execute(async { Ok(()) }));
        assert!(matches!(result, Err(BreakerError::Open { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let cb = breaker(BreakerConfig::default().with_min_requests(1));
        fail(&cb, 1);
        cb.reset();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts(), Counts::default());
    }
}
