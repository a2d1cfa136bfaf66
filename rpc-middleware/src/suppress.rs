//! Span error suppression.
//!
//! A suppressed error still reaches the caller and still counts in metrics;
//! only the span is annotated as successful.

use std::sync::Arc;

use crate::classify::ErrorClassification;

/// Decides whether a classified error is hidden from spans.
pub trait Suppressor: Send + Sync + 'static {
    /// Return `true` to record the span as successful.
    fn suppress(&self, classification: &ErrorClassification) -> bool;
}

/// Suppresses declared exceptions, which are ordinary contract results.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredExceptionSuppressor;

impl Suppressor for DeclaredExceptionSuppressor {
    fn suppress(&self, classification: &ErrorClassification) -> bool {
        matches!(classification, ErrorClassification::DeclaredException(_))
    }
}

/// Suppresses nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSuppression;

impl Suppressor for NoSuppression {
    fn suppress(&self, _classification: &ErrorClassification) -> bool {
        false
    }
}

impl<F> Suppressor for F
where
    F: Fn(&ErrorClassification) -> bool + Send + Sync + 'static,
{
    fn suppress(&self, classification: &ErrorClassification) -> bool {
        self(classification)
    }
}

/// The suppressor used when none is configured.
#[must_use]
pub fn default_suppressor() -> Arc<dyn Suppressor> {
    Arc::new(DeclaredExceptionSuppressor)
}
