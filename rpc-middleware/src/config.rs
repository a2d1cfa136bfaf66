//! Client configuration.
//!
//! Everything a default client chain needs. Values can be built in code or
//! loaded from `{PREFIX}_*` environment variables with [`ClientConfig::from_env`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rpc_common::config::{EnvSource, env_key};
use rpc_common::{BreakerConfig, ConfigError, RetryConfig};

use crate::middleware::headers::{EdgeContextCodec, PassthroughEdgeContext};
use crate::middleware::retry::{RetryFilter, with_default_retry_filters};
use crate::suppress::{Suppressor, default_suppressor};

/// Configuration of a client chain.
#[derive(Clone)]
pub struct ClientConfig {
    /// Short name of the remote service; prefixes span names and labels metrics
    pub service_slug: String,
    /// Sent as `User-Agent`; empty omits the header
    pub client_name: String,
    /// Retry schedule; one attempt means no retries
    pub retry: RetryConfig,
    /// Ordered retry filters
    pub retry_filters: Vec<Arc<dyn RetryFilter>>,
    /// Circuit breaker, disabled when `None`
    pub breaker: Option<BreakerConfig>,
    /// Span error suppressor
    pub suppressor: Arc<dyn Suppressor>,
    /// Edge context header codec
    pub edge_context: Arc<dyn EdgeContextCodec>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("service_slug", &self.service_slug)
            .field("client_name", &self.client_name)
            .field("retry", &self.retry)
            .field("retry_filters", &self.retry_filters.len())
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Defaults for calling `service_slug`: one attempt, no breaker, declared
    /// exceptions suppressed from spans.
    pub fn new(service_slug: impl Into<String>) -> Self {
        Self {
            service_slug: service_slug.into(),
            client_name: String::new(),
            retry: RetryConfig::default(),
            retry_filters: with_default_retry_filters(Vec::new()),
            breaker: None,
            suppressor: default_suppressor(),
            edge_context: Arc::new(PassthroughEdgeContext),
        }
    }

    /// Set the client name.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Set the retry schedule.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Use the default retry filters followed by `extra`.
    #[must_use]
    pub fn with_retry_filters(mut self, extra: Vec<Arc<dyn RetryFilter>>) -> Self {
        self.retry_filters = with_default_retry_filters(extra);
        self
    }

    /// Enable the circuit breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Replace the span error suppressor.
    #[must_use]
    pub fn with_suppressor(mut self, suppressor: Arc<dyn Suppressor>) -> Self {
        self.suppressor = suppressor;
        self
    }

    /// Replace the edge context codec.
    #[must_use]
    pub fn with_edge_context(mut self, codec: Arc<dyn EdgeContextCodec>) -> Self {
        self.edge_context = codec;
        self
    }

    /// Load from environment variables named `{prefix}_{KEY}`.
    ///
    /// `SERVICE_SLUG` is required. The breaker is configured only when
    /// `BREAKER_ENABLED` is true; it is named after the service slug.
    pub fn from_env(env: &EnvSource, prefix: &str) -> Result<Self, ConfigError> {
        let key = |name: &str| env_key(prefix, name);

        let service_slug = env
            .get(&key("SERVICE_SLUG"))
            .ok_or_else(|| ConfigError::MissingRequired(key("SERVICE_SLUG")))?;

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            attempts: env.parse_or(&key("RETRY_ATTEMPTS"), retry_defaults.attempts)?,
            initial_delay: env
                .duration_ms_or(&key("RETRY_INITIAL_DELAY_MS"), retry_defaults.initial_delay)?,
            max_delay: env.duration_ms_or(&key("RETRY_MAX_DELAY_MS"), retry_defaults.max_delay)?,
            ..retry_defaults
        };

        let breaker = if env.parse_or(&key("BREAKER_ENABLED"), false)? {
            let defaults = BreakerConfig::named(service_slug.clone());
            Some(BreakerConfig {
                threshold: env.parse_or(&key("BREAKER_THRESHOLD"), defaults.threshold)?,
                min_requests: env.parse_or(&key("BREAKER_MIN_REQUESTS"), defaults.min_requests)?,
                window: env.duration_ms_or(&key("BREAKER_WINDOW_MS"), defaults.window)?,
                open_timeout: env.duration_ms_or(&key("BREAKER_TIMEOUT_MS"), defaults.open_timeout)?,
                max_trial_requests: env
                    .parse_or(&key("BREAKER_TRIAL_REQUESTS"), defaults.max_trial_requests)?,
                ..defaults
            })
        } else {
            None
        };

        let config = Self {
            client_name: env.get(&key("CLIENT_NAME")).unwrap_or_default(),
            retry,
            breaker,
            ..Self::new(service_slug)
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_slug.trim().is_empty() {
            return Err(ConfigError::out_of_range("service_slug", "must not be empty"));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::out_of_range("retry.attempts", "must be at least 1"));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(ConfigError::out_of_range(
                "retry.initial_delay",
                "must not exceed retry.max_delay",
            ));
        }
        if let Some(breaker) = &self.breaker {
            if !(breaker.threshold > 0.0 && breaker.threshold <= 1.0) {
                return Err(ConfigError::out_of_range("breaker.threshold", "must be in (0, 1]"));
            }
            if breaker.max_trial_requests == 0 {
                return Err(ConfigError::out_of_range(
                    "breaker.max_trial_requests",
                    "must be at least 1",
                ));
            }
            if breaker.window == Duration::ZERO {
                return Err(ConfigError::out_of_range("breaker.window", "must be positive"));
            }
            if breaker.open_timeout == Duration::ZERO {
                return Err(ConfigError::out_of_range(
                    "breaker.open_timeout",
                    "must be positive",
                ));
            }
        }
        Ok(())
    }
}
