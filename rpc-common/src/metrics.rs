//! Prometheus metrics helpers.
//!
//! Metric objects are created once against a [`Registry`] at startup and
//! shared by reference; nothing in this crate registers into a global
//! registry implicitly.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::circuit_breaker::CircuitState;

/// Circuit breaker metrics.
#[derive(Clone)]
pub struct BreakerMetrics {
    /// State transitions counter
    pub state_changes: IntCounterVec,
    /// Current state gauge (0=closed, 1=open, 2=half-open)
    pub current_state: IntGaugeVec,
}

impl std::fmt::Debug for BreakerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerMetrics").finish_non_exhaustive()
    }
}

impl BreakerMetrics {
    /// Create breaker metrics and register them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let state_changes = IntCounterVec::new(
            Opts::new(
                "breaker_state_changes_total",
                "Total circuit breaker state changes",
            ),
            &["breaker", "from_state", "to_state"],
        )?;
        registry.register(Box::new(state_changes.clone()))?;

        let current_state = IntGaugeVec::new(
            Opts::new("breaker_state", "Current circuit breaker state"),
            &["breaker"],
        )?;
        registry.register(Box::new(current_state.clone()))?;

        Ok(Self {
            state_changes,
            current_state,
        })
    }

    /// Record a state transition.
    pub fn record_transition(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        self.state_changes
            .with_label_values(&[breaker, from.as_str(), to.as_str()])
            .inc();
        self.set_state(breaker, to);
    }

    /// Set the current state gauge.
    pub fn set_state(&self, breaker: &str, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.current_state.with_label_values(&[breaker]).set(value);
    }
}

/// Encode every metric family in `registry` in the Prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_transitions() {
        let registry = Registry::new();
        let metrics = BreakerMetrics::new(&registry).unwrap();

        metrics.record_transition("profile", CircuitState::Closed, CircuitState::Open);

        assert_eq!(
            metrics
                .state_changes
                .with_label_values(&["profile", "closed", "open"])
                .get(),
            1
        );
        assert_eq!(metrics.current_state.with_label_values(&["profile"]).get(), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let registry = Registry::new();
        let metrics = BreakerMetrics::new(&registry).unwrap();
        metrics.set_state("profile", CircuitState::HalfOpen);

        let output = encode_text(&registry).unwrap();
        assert!(output.contains("# TYPE breaker_state gauge"));
        assert!(output.contains("breaker_state{breaker=\"profile\"} 2"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = Registry::new();
        BreakerMetrics::new(&registry).unwrap();
        assert!(BreakerMetrics::new(&registry).is_err());
    }
}
