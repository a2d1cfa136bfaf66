//! Call-interception middleware for RPC clients and servers.
//!
//! Every remote call flows through an ordered chain of middlewares that add
//! distributed tracing, retries under a circuit breaker, deadline-budget
//! propagation and Prometheus metrics without the call site knowing.
//!
//! The pieces, bottom-up:
//! - [`classify`] turns a call outcome into an [`ErrorClassification`]
//! - [`suppress`] decides which classified errors are hidden from spans
//! - [`metrics`] and [`trace`] hold the process-scoped metric and span state
//! - [`middleware`] contains the tower layers operating on a [`Call`]
//! - [`chain`] composes an ordered list of middlewares into one handler
//! - [`client`] wraps a built chain for call sites
//!
//! ```no_run
//! use std::sync::Arc;
//! use rpc_middleware::{Client, ClientConfig, Observability};
//! # fn transport() -> Arc<dyn rpc_middleware::Transport> { unimplemented!() }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = prometheus::Registry::new();
//! let observability = Observability::new(&registry)?;
//! let config = ClientConfig::new("profile").with_client_name("feed-service");
//! let client = Client::from_transport(&config, &observability, transport());
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod call;
pub mod chain;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod middleware;
pub mod status;
pub mod suppress;
pub mod trace;
pub mod transport;

pub use call::{
    Call, CallContext, CallType, CancelHandle, CancelSignal, DeclaredException,
    EdgeRequestContext, Headers, Payload, Response, ResponseMeta, ResultBody,
};
pub use chain::{MiddlewareChain, build};
pub use classify::{ErrorClassification, ErrorKind, classify, classify_outcome};
pub use client::Client;
pub use config::ClientConfig;
pub use error::RpcError;
pub use metrics::{MetricLabelSet, RpcMetrics};
pub use middleware::stack::{
    Observability, WRAPPED_SLUG_SUFFIX, default_client_middlewares, default_server_middlewares,
};
pub use middleware::{CallHandler, Middleware, handler_fn};
pub use suppress::{DeclaredExceptionSuppressor, NoSuppression, Suppressor};
pub use trace::{FinishedSpan, LogSpanRecorder, SpanContext, SpanKind, SpanRecorder};
pub use transport::{Transport, transport_handler};
