//! Error types shared by the resilience primitives.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// What went wrong
        reason: String,
    },

    /// A value was parsed but is out of its allowed range
    #[error("Invalid value for {field}: {reason}")]
    OutOfRange {
        /// Field name
        field: String,
        /// Allowed range description
        reason: String,
    },
}

impl ConfigError {
    /// Create an out-of-range error for the given field.
    #[must_use]
    pub fn out_of_range(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced by [`FailureRatioBreaker::execute`](crate::FailureRatioBreaker::execute).
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// Circuit is open, the operation was not attempted
    #[error("Circuit breaker open for {breaker}, retry after {retry_after:?}")]
    Open {
        /// Breaker name
        breaker: String,
        /// Time until the breaker lets trial requests through
        retry_after: Duration,
    },

    /// The operation ran and failed
    #[error(transparent)]
    Inner(E),
}

/// Tracing subscriber initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed
    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}
