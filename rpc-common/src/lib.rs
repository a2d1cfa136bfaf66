//! Shared library for cross-cutting concerns of RPC pipelines.
//!
//! This crate provides the executors and ambient plumbing the middleware
//! pipeline consumes:
//! - Retry scheduling with exponential backoff and cancellable waits
//! - A failure-ratio circuit breaker shared across calls
//! - Environment-driven configuration helpers
//! - Tracing subscriber initialization
//! - Prometheus registry helpers and breaker metrics

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod tracing_config;

pub use circuit_breaker::{BreakerConfig, BreakerPermit, CircuitState, FailureRatioBreaker};
pub use error::{BreakerError, ConfigError, TelemetryError};
pub use metrics::BreakerMetrics;
pub use retry::{RetryConfig, RetryPolicy};
pub use tracing_config::{TracingConfig, init_tracing};
