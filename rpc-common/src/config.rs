//! Environment-driven configuration helpers.
//!
//! Values are read through an [`EnvSource`] so loaders can be exercised in
//! tests without touching the process environment.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Source of configuration variables.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The process environment, after loading a `.env` file if present
    #[default]
    Process,
    /// A fixed set of variables
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    /// Read the process environment, loading `.env` first.
    #[must_use]
    pub fn from_process() -> Self {
        dotenvy::dotenv().ok();
        Self::Process
    }

    /// Build a fixed source from key/value pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fixed(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var(name).ok(),
            Self::Fixed(vars) => vars.get(name).cloned(),
        }
    }

    /// Parse a variable, falling back to `default` when unset.
    pub fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse(name).map(|value| value.unwrap_or(default))
    }

    /// Parse a variable if it is set.
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(val) => val
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::ParseError {
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Parse a millisecond duration variable, falling back to `default`.
    pub fn duration_ms_or(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse::<u64>(name)?
            .map_or(default, Duration::from_millis))
    }
}

/// Join a prefix and a key the way every loader in the workspace does.
#[must_use]
pub fn env_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}_{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default() {
        let env = EnvSource::from_pairs([("ATTEMPTS", "3")]);
        assert_eq!(env.parse_or("ATTEMPTS", 1u32).unwrap(), 3);
        assert_eq!(env.parse_or("MISSING", 7u32).unwrap(), 7);
    }

    #[test]
    fn test_parse_error_names_variable() {
        let env = EnvSource::from_pairs([("ATTEMPTS", "three")]);
        let err = env.parse::<u32>("ATTEMPTS").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref name, .. } if name == "ATTEMPTS"));
    }

    #[test]
    fn test_duration_ms() {
        let env = EnvSource::from_pairs([("DELAY_MS", "250")]);
        assert_eq!(
            env.duration_ms_or("DELAY_MS", Duration::ZERO).unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("RPC", "SERVICE_SLUG"), "RPC_SERVICE_SLUG");
        assert_eq!(env_key("", "SERVICE_SLUG"), "SERVICE_SLUG");
    }
}
