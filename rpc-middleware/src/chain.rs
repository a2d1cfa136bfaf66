//! Middleware chain composition.
//!
//! The first middleware in a list is the outermost: it sees the call first
//! and the outcome last.

use std::fmt;
use std::sync::Arc;

use crate::middleware::{CallHandler, Middleware};

/// Compose `middlewares` around `terminal`.
///
/// An empty list returns `terminal` unchanged.
#[must_use]
pub fn build(middlewares: &[Arc<dyn Middleware>], terminal: CallHandler) -> CallHandler {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware.wrap(next))
}

/// Ordered list of middlewares, outermost first.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware inside those already added.
    #[must_use]
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append an already shared middleware.
    #[must_use]
    pub fn with_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Append several middlewares, keeping their order.
    #[must_use]
    pub fn extend(mut self, middlewares: impl IntoIterator<Item = Arc<dyn Middleware>>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    /// Number of middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the chain has no middlewares.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Compose the chain around `terminal`.
    #[must_use]
    pub fn build(&self, terminal: CallHandler) -> CallHandler {
        build(&self.middlewares, terminal)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

impl From<Vec<Arc<dyn Middleware>>> for MiddlewareChain {
    fn from(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }
}
