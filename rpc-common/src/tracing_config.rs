//! Tracing subscriber initialization.
//!
//! This module installs the global `tracing` subscriber used for structured
//! logs and for the log-based span recorder.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{EnvSource, env_key};
use crate::error::{ConfigError, TelemetryError};

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Service name attached to every event
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "rpc-client".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Load from `{prefix}_SERVICE_NAME`, `{prefix}_LOG_LEVEL` and `{prefix}_LOG_JSON`.
    pub fn from_env(env: &EnvSource, prefix: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            service_name: env
                .get(&env_key(prefix, "SERVICE_NAME"))
                .unwrap_or(defaults.service_name),
            log_level: env
                .get(&env_key(prefix, "LOG_LEVEL"))
                .unwrap_or(defaults.log_level),
            json_output: env.parse_or(&env_key(prefix, "LOG_JSON"), defaults.json_output)?,
        })
    }
}

/// Initialize tracing with the given configuration.
///
/// Installs the global subscriber; call once at startup. A second call
/// returns [`TelemetryError::Install`].
pub fn init_tracing(config: &TracingConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    result.map_err(|e| TelemetryError::Install(e.to_string()))?;

    tracing::info!(service = %config.service_name, "tracing initialized");
    Ok(())
}
