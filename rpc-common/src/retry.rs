//! Retry schedule executor with exponential backoff.
//!
//! The executor is deliberately ignorant of what an outcome means: callers
//! supply the operation, the predicate deciding whether another attempt is
//! worth it, and a cancellation future that cuts the backoff wait short.

use std::future::Future;
use std::time::Duration;

/// Retry schedule configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set the total number of attempts.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Retry policy executing operations under a [`RetryConfig`] schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration (a single attempt).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Calculate the delay after the given zero-based attempt.
    ///
    /// Uses exponential backoff with optional jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        let final_delay = if self.config.jitter {
            // Add up to 25% jitter
            let jitter_factor = 1.0 + (rand::random::<f64>() * 0.25);
            delay_ms * jitter_factor
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Total number of attempts this policy allows, never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.attempts.max(1)
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it produces an outcome `retry_if` rejects, the
    /// attempt budget is spent, or `cancelled` resolves during a backoff wait.
    ///
    /// `operation` receives the zero-based attempt number. `retry_if`
    /// receives the outcome and the number of attempts made so far. The
    /// value returned is always the outcome of the last attempt.
    pub async fn run<O, F, Fut, R, C>(&self, mut operation: F, mut retry_if: R, cancelled: C) -> O
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = O>,
        R: FnMut(&O, u32) -> bool,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancelled);
        let max_attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            let outcome = operation(attempt).await;
            attempt += 1;
            if attempt >= max_attempts || !retry_if(&outcome, attempt) {
                return outcome;
            }

            let delay = self.delay_for_attempt(attempt - 1);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = &mut cancelled => return outcome,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.attempts, 1);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_delay_calculation_no_jitter() {
        let config = RetryConfig::default().without_jitter();
        let policy = RetryPolicy::new(config);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig::default()
            .without_jitter()
            .with_max_delay(Duration::from_millis(150));
        let policy = RetryPolicy::new(config);

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(150));
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(RetryConfig::default().with_attempts(0));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exhausts_attempts_and_returns_last() {
        let policy = RetryPolicy::new(RetryConfig::default().with_attempts(3).without_jitter());
        let calls = AtomicU32::new(0);

        let outcome: Result<(), u32> = policy
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(attempt) }
                },
                |_, _| true,
                std::future::pending(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome, Err(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_predicate_rejects() {
        let policy = RetryPolicy::new(RetryConfig::default().with_attempts(5));
        let calls = AtomicU32::new(0);

        let outcome: Result<u32, u32> = policy
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { if attempt == 1 { Ok(attempt) } else { Err(attempt) } }
                },
                |outcome, _| outcome.is_err(),
                std::future::pending(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancelled_during_backoff() {
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .with_attempts(10)
                .with_initial_delay(Duration::from_secs(60))
                .without_jitter(),
        );
        let calls = AtomicU32::new(0);

        let outcome: Result<(), u32> = policy
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(attempt) }
                },
                |_, _| true,
                tokio::time::sleep(Duration::from_millis(5)),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome, Err(0));
    }
}
