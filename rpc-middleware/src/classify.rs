//! Outcome classification.
//!
//! Every middleware that needs to know what kind of failure happened asks
//! [`classify`] instead of inspecting errors itself, so retry filters, the
//! breaker, spans and metrics all agree on the answer.

use crate::call::{DeclaredException, Response};
use crate::error::RpcError;
use crate::status::{status_name, status_retryable};

/// Classified outcome of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClassification {
    /// No error
    Success,
    /// Network or serialization failure
    TransportError {
        /// Explicit retryability hint
        retryable: Option<bool>,
    },
    /// Exception from the service's own interface contract
    DeclaredException(DeclaredException),
    /// Status-bearing application error
    ApplicationError {
        /// Status code
        code: i32,
        /// Retryability hint
        retryable: Option<bool>,
        /// Declared exception type, when the error arrived in a result slot
        exception_type: Option<String>,
    },
    /// The caller's context was cancelled or its deadline passed
    ContextCancelled,
}

/// Fieldless view of [`ErrorClassification`], used for labels and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No error
    Success,
    /// Network or serialization failure
    Transport,
    /// Declared exception
    Declared,
    /// Application error
    Application,
    /// Cancelled or deadline exceeded
    ContextCancelled,
}

impl ErrorKind {
    /// String representation used in logs and the `exception_type` label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "",
            Self::Transport => "TransportError",
            Self::Declared => "DeclaredException",
            Self::Application => "ApplicationError",
            Self::ContextCancelled => "ContextCancelled",
        }
    }
}

/// Classify an outcome given as an optional response and optional error.
///
/// An error takes precedence over the response. With neither present the
/// call succeeded.
#[must_use]
pub fn classify(response: Option<&Response>, err: Option<&RpcError>) -> ErrorClassification {
    if let Some(err) = err {
        return classify_error(err);
    }
    response
        .and_then(|r| r.body.exception())
        .map_or(ErrorClassification::Success, classify_exception)
}

/// Classify the result returned by a call handler.
#[must_use]
pub fn classify_outcome(outcome: &Result<Response, RpcError>) -> ErrorClassification {
    match outcome {
        Ok(response) => classify(Some(response), None),
        Err(err) => classify(None, Some(err)),
    }
}

fn classify_error(err: &RpcError) -> ErrorClassification {
    match err {
        RpcError::Transport { retryable, .. } => ErrorClassification::TransportError {
            retryable: *retryable,
        },
        RpcError::CircuitOpen { .. } => ErrorClassification::TransportError {
            retryable: Some(false),
        },
        RpcError::Remote { code, .. } => ErrorClassification::ApplicationError {
            code: *code,
            retryable: status_retryable(*code),
            exception_type: None,
        },
        RpcError::Application {
            code, retryable, ..
        } => ErrorClassification::ApplicationError {
            code: *code,
            retryable: retryable.or_else(|| status_retryable(*code)),
            exception_type: None,
        },
        RpcError::Declared(exc) => classify_exception(exc),
        RpcError::Cancelled | RpcError::DeadlineExceeded => ErrorClassification::ContextCancelled,
    }
}

fn classify_exception(exc: &DeclaredException) -> ErrorClassification {
    match exc.code {
        Some(code) => ErrorClassification::ApplicationError {
            code,
            retryable: exc.retryable.or_else(|| status_retryable(code)),
            exception_type: Some(exc.type_name.clone()),
        },
        None => ErrorClassification::DeclaredException(exc.clone()),
    }
}

impl ErrorClassification {
    /// Fieldless kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Success => ErrorKind::Success,
            Self::TransportError { .. } => ErrorKind::Transport,
            Self::DeclaredException(_) => ErrorKind::Declared,
            Self::ApplicationError { .. } => ErrorKind::Application,
            Self::ContextCancelled => ErrorKind::ContextCancelled,
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Retryability hint.
    ///
    /// Transport errors default to retryable; a cancelled context never is.
    /// `None` means no source expressed an opinion.
    #[must_use]
    pub fn retryable_hint(&self) -> Option<bool> {
        match self {
            Self::Success => None,
            Self::TransportError { retryable } => Some(retryable.unwrap_or(true)),
            Self::DeclaredException(exc) => exc.retryable,
            Self::ApplicationError { retryable, .. } => *retryable,
            Self::ContextCancelled => Some(false),
        }
    }

    /// Breaker verdict: `Some(true)` for a healthy response, `Some(false)`
    /// for a failure, `None` when the outcome says nothing about the remote
    /// side's health.
    #[must_use]
    pub const fn breaker_outcome(&self) -> Option<bool> {
        match self {
            Self::Success | Self::DeclaredException(_) => Some(true),
            Self::TransportError { .. } | Self::ApplicationError { .. } => Some(false),
            Self::ContextCancelled => None,
        }
    }

    /// Value of the `exception_type` label: empty on success, the declared
    /// type name when known, otherwise the kind.
    #[must_use]
    pub fn exception_type(&self) -> &str {
        match self {
            Self::DeclaredException(exc) => &exc.type_name,
            Self::ApplicationError {
                exception_type: Some(name),
                ..
            } => name,
            other => other.kind().as_str(),
        }
    }

    /// Status code of an application error.
    #[must_use]
    pub const fn status_code(&self) -> Option<i32> {
        match self {
            Self::ApplicationError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Symbolic status name of an application error; empty for unknown codes.
    #[must_use]
    pub fn status_name(&self) -> &'static str {
        self.status_code().and_then(status_name).unwrap_or("")
    }
}
