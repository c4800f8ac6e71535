use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Backoff policy applied when the change-stream connection drops.
///
/// Every field is optional in configuration files; missing ones take the values of
/// [`ReconnectionConfig::default`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    /// A disabled policy turns the first stream error into a fatal one.
    pub enabled: bool,
    pub initial_retry_delay_ms: u64,
    /// Cap on the delay between two attempts.
    pub max_retry_delay_ms: u64,
    /// Growth factor of the delay, at least 1.0.
    pub backoff_multiplier: f64,
    /// How long an outage may last, counted from its first failure.
    pub max_retry_duration_ms: u64,
}

impl ReconnectionConfig {
    pub const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 60_000;
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const DEFAULT_MAX_RETRY_DURATION_MS: u64 = 300_000;

    pub fn max_retry_duration(&self) -> Duration {
        Duration::from_millis(self.max_retry_duration_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |field: &str, constraint: &str| ValidationError::InvalidFieldValue {
            field: format!("stream.reconnection.{field}"),
            constraint: constraint.to_string(),
        };

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(invalid("backoff_multiplier", "must be at least 1.0"));
        }

        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            return Err(invalid(
                "initial_retry_delay_ms",
                "must not exceed `max_retry_delay_ms`",
            ));
        }

        Ok(())
    }
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_retry_delay_ms: Self::DEFAULT_INITIAL_RETRY_DELAY_MS,
            max_retry_delay_ms: Self::DEFAULT_MAX_RETRY_DELAY_MS,
            backoff_multiplier: Self::DEFAULT_BACKOFF_MULTIPLIER,
            max_retry_duration_ms: Self::DEFAULT_MAX_RETRY_DURATION_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_remaining_defaults() {
        let config: ReconnectionConfig =
            serde_json::from_str(r#"{"max_retry_duration_ms": 900000}"#).unwrap();

        assert!(config.enabled);
        assert_eq!(config.initial_retry_delay_ms, 1_000);
        assert_eq!(config.max_retry_duration(), Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shrinking_multiplier_is_rejected() {
        let config = ReconnectionConfig {
            backoff_multiplier: 0.5,
            ..Default::default()
        };

        assert!(config.validate().is_err());

        let config = ReconnectionConfig {
            backoff_multiplier: f64::NAN,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn initial_delay_above_cap_is_rejected() {
        let config = ReconnectionConfig {
            initial_retry_delay_ms: 10_000,
            max_retry_delay_ms: 1_000,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
