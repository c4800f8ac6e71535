use std::time::Duration;

use serde::Deserialize;

use crate::shared::{ReconnectionConfig, ValidationError};

/// Location of the change-stream reader and how to stay connected to it.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
    /// Timeout for establishing the stream connection, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub reconnection: ReconnectionConfig,
}

impl StreamConfig {
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.reconnection.validate()
    }
}

fn default_connect_timeout_ms() -> u64 {
    StreamConfig::DEFAULT_CONNECT_TIMEOUT_MS
}
