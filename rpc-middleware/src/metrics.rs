//! Prometheus metrics for calls.
//!
//! One [`RpcMetrics`] is registered per process and side (client or server)
//! and shared by every metrics middleware; the `target` label tells the
//! individual chain positions apart.

use std::fmt;
use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use crate::call::CallType;
use crate::classify::ErrorClassification;

/// Latency buckets in seconds, from 100µs to 10s.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
    5.0, 10.0,
];

const ACTIVE_LABELS: &[&str] = &["method", "target"];
const LATENCY_LABELS: &[&str] = &["method", "type", "success", "target"];
const REQUEST_LABELS: &[&str] = &[
    "method",
    "type",
    "success",
    "target",
    "exception_type",
    "status_code",
    "status_name",
];

/// Label values describing one finished call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabelSet {
    /// Method name
    pub method: String,
    /// `unary` or `oneway`
    pub call_type: &'static str,
    /// `true` or `false`
    pub success: bool,
    /// Chain position, usually the service slug
    pub target: String,
    /// Declared type name or error kind; empty on success
    pub exception_type: String,
    /// Numeric status code of an application error; empty otherwise
    pub status_code: String,
    /// Symbolic status name; empty when unknown
    pub status_name: String,
}

impl MetricLabelSet {
    /// Derive labels from a classified outcome.
    #[must_use]
    pub fn from_outcome(
        method: &str,
        call_type: CallType,
        target: &str,
        classification: &ErrorClassification,
    ) -> Self {
        Self {
            method: method.to_string(),
            call_type: call_type.as_str(),
            success: classification.is_success(),
            target: target.to_string(),
            exception_type: classification.exception_type().to_string(),
            status_code: classification
                .status_code()
                .map(|code| code.to_string())
                .unwrap_or_default(),
            status_name: classification.status_name().to_string(),
        }
    }

    fn success_label(&self) -> &'static str {
        if self.success { "true" } else { "false" }
    }

    fn latency_values(&self) -> [&str; 4] {
        [&self.method, self.call_type, self.success_label(), &self.target]
    }

    fn request_values(&self) -> [&str; 7] {
        [
            &self.method,
            self.call_type,
            self.success_label(),
            &self.target,
            &self.exception_type,
            &self.status_code,
            &self.status_name,
        ]
    }
}

/// Call metrics.
#[derive(Clone)]
pub struct RpcMetrics {
    active_requests: IntGaugeVec,
    latency_seconds: HistogramVec,
    requests_total: IntCounterVec,
}

impl fmt::Debug for RpcMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcMetrics").finish_non_exhaustive()
    }
}

impl RpcMetrics {
    /// Create call metrics without a namespace and register them.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Self::with_namespace(registry, "")
    }

    /// Create call metrics under `namespace` and register them.
    pub fn with_namespace(registry: &Registry, namespace: &str) -> Result<Self, prometheus::Error> {
        let active_requests = IntGaugeVec::new(
            Opts::new("active_requests", "Calls currently in flight").namespace(namespace),
            ACTIVE_LABELS,
        )?;
        registry.register(Box::new(active_requests.clone()))?;

        let latency_seconds = HistogramVec::new(
            HistogramOpts::new("latency_seconds", "Call latency in seconds")
                .namespace(namespace)
                .buckets(LATENCY_BUCKETS.to_vec()),
            LATENCY_LABELS,
        )?;
        registry.register(Box::new(latency_seconds.clone()))?;

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total calls").namespace(namespace),
            REQUEST_LABELS,
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        Ok(Self {
            active_requests,
            latency_seconds,
            requests_total,
        })
    }

    /// Count a call as in flight until the returned guard is dropped.
    #[must_use = "the call stops counting as active when the guard is dropped"]
    pub fn start(&self, method: &str, target: &str) -> ActiveRequest {
        let gauge = self.active_requests.with_label_values(&[method, target]);
        gauge.inc();
        ActiveRequest { gauge }
    }

    /// Record a finished call.
    pub fn observe(&self, labels: &MetricLabelSet, latency: Duration) {
        self.latency_seconds
            .with_label_values(&labels.latency_values())
            .observe(latency.as_secs_f64());
        self.requests_total
            .with_label_values(&labels.request_values())
            .inc();
    }

    /// Current in-flight count.
    #[must_use]
    pub fn active(&self, method: &str, target: &str) -> i64 {
        self.active_requests
            .with_label_values(&[method, target])
            .get()
    }

    /// Calls recorded with exactly these labels.
    #[must_use]
    pub fn requests(&self, labels: &MetricLabelSet) -> u64 {
        self.requests_total
            .with_label_values(&labels.request_values())
            .get()
    }

    /// Latency observations recorded with these labels.
    #[must_use]
    pub fn latency_count(&self, labels: &MetricLabelSet) -> u64 {
        self.latency_seconds
            .with_label_values(&labels.latency_values())
            .get_sample_count()
    }
}

/// Keeps a call counted in `active_requests`.
pub struct ActiveRequest {
    gauge: IntGauge,
}

impl fmt::Debug for ActiveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveRequest")
            .field("active", &self.gauge.get())
            .finish()
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::DeclaredException;

    #[test]
    fn test_labels_for_success() {
        let labels =
            MetricLabelSet::from_outcome("Ping", CallType::Unary, "svc", &ErrorClassification::Success);
        assert!(labels.success);
        assert_eq!(labels.request_values(), ["Ping", "unary", "true", "svc", "", "", ""]);
    }

    #[test]
    fn test_labels_for_application_error() {
        let classification = ErrorClassification::ApplicationError {
            code: 404,
            retryable: Some(false),
            exception_type: None,
        };
        let labels = MetricLabelSet::from_outcome("Get", CallType::Unary, "svc", &classification);
        assert_eq!(
            labels.request_values(),
            ["Get", "unary", "false", "svc", "ApplicationError", "404", "NOT_FOUND"]
        );
    }

    #[test]
    fn test_labels_for_declared_exception() {
        let classification =
            ErrorClassification::DeclaredException(DeclaredException::new("UserNotFound", "x"));
        let labels = MetricLabelSet::from_outcome("Get", CallType::Oneway, "svc", &classification);
        assert_eq!(labels.exception_type, "UserNotFound");
        assert_eq!(labels.call_type, "oneway");
    }

    #[test]
    fn test_active_guard_balances() {
        let registry = Registry::new();
        let metrics = RpcMetrics::new(&registry).unwrap();

        let first = metrics.start("Ping", "svc");
        let second = metrics.start("Ping", "svc");
        assert_eq!(metrics.active("Ping", "svc"), 2);
        drop(first);
        drop(second);
        assert_eq!(metrics.active("Ping", "svc"), 0);
    }

    #[test]
    fn test_observe_and_encode() {
        let registry = Registry::new();
        let metrics = RpcMetrics::with_namespace(&registry, "server").unwrap();
        let labels =
            MetricLabelSet::from_outcome("Ping", CallType::Unary, "svc", &ErrorClassification::Success);

        metrics.observe(&labels, Duration::from_millis(3));
        assert_eq!(metrics.requests(&labels), 1);
        assert_eq!(metrics.latency_count(&labels), 1);

        let text = rpc_common::metrics::encode_text(&registry).unwrap();
        assert!(text.contains("server_requests_total"));
        assert!(text.contains("server_latency_seconds_bucket"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        RpcMetrics::new(&registry).unwrap();
        assert!(RpcMetrics::new(&registry).is_err());
    }
}
