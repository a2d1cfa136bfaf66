//! Error type returned by every call handler.
//!
//! Variants describe where a failure came from. Policy questions (is it
//! retryable, does it count against the breaker, is it hidden from spans)
//! are answered on the [`ErrorClassification`](crate::ErrorClassification)
//! derived from it, never by matching on this type downstream.

use std::time::Duration;
use thiserror::Error;

use crate::call::DeclaredException;

/// Non-exhaustive error enum for forward compatibility.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// Network or serialization failure; no structured response exists
    #[error("Transport error: {message}")]
    Transport {
        /// What failed
        message: String,
        /// Explicit retryability hint, if the transport knows better than the default
        retryable: Option<bool>,
    },

    /// Raw status failure reported by the remote side, before translation
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Numeric status code
        code: i32,
        /// Message from the remote side
        message: String,
    },

    /// Status-bearing application error
    #[error("Application error {code}: {message}")]
    Application {
        /// Numeric status code
        code: i32,
        /// Message from the remote side
        message: String,
        /// Retryability hint for this code
        retryable: Option<bool>,
    },

    /// Exception declared in the service's own interface contract
    #[error("{}: {}", .0.type_name, .0.message)]
    Declared(DeclaredException),

    /// The caller cancelled the call
    #[error("Call cancelled")]
    Cancelled,

    /// The call's deadline passed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Circuit breaker is open for the service
    #[error("Circuit breaker open for {service}")]
    CircuitOpen {
        /// Service whose breaker rejected the call
        service: String,
        /// Time until the breaker lets trial calls through
        retry_after: Duration,
    },
}

impl RpcError {
    /// Create a transport error with the default retryability.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: None,
        }
    }

    /// Create a transport error with an explicit retryability hint.
    #[must_use]
    pub fn transport_with_hint(message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: Some(retryable),
        }
    }

    /// Create a raw remote status error.
    #[must_use]
    pub fn remote(code: i32, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    /// Create a circuit open error for the given service.
    #[must_use]
    pub fn circuit_open(service: impl Into<String>, retry_after: Duration) -> Self {
        Self::CircuitOpen {
            service: service.into(),
            retry_after,
        }
    }

    /// Whether the error comes from the caller's own context.
    #[must_use]
    pub const fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RpcError::transport("connection reset").to_string(),
            "Transport error: connection reset"
        );
        assert_eq!(
            RpcError::circuit_open("profile", Duration::from_secs(1)).to_string(),
            "Circuit breaker open for profile"
        );

        let exc = DeclaredException::new("UserNotFound", "no such user");
        assert_eq!(
            RpcError::Declared(exc).to_string(),
            "UserNotFound: no such user"
        );
    }

    #[test]
    fn test_context_errors() {
        assert!(RpcError::Cancelled.is_context_error());
        assert!(RpcError::DeadlineExceeded.is_context_error());
        assert!(!RpcError::transport("x").is_context_error());
    }
}
