use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Connection settings for the source MySQL database.
///
/// Only the reference tables are read through this connection; row changes arrive through the
/// change stream.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Name of the database holding the monitored and reference tables.
    pub name: String,
    pub username: String,
    pub password: Option<SecretString>,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl SourceConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.tls.validate()
    }
}

/// Connection settings for the real-time index, reached over SphinxQL.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConnectionConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Name of the real-time index receiving the mutations.
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Upper bound of pooled connections to the index.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Maximum time to wait for a pooled connection, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl IndexConnectionConfig {
    pub const DEFAULT_INDEX_NAME: &'static str = "releases_rt";

    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.index_name.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "index.index_name".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.max_connections == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "index.max_connections".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_index_name() -> String {
    IndexConnectionConfig::DEFAULT_INDEX_NAME.to_string()
}

fn default_max_connections() -> u32 {
    IndexConnectionConfig::DEFAULT_MAX_CONNECTIONS
}

fn default_acquire_timeout_ms() -> u64 {
    IndexConnectionConfig::DEFAULT_ACQUIRE_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM encoded root certificates trusted when verifying the server.
    #[serde(default)]
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: String::new(),
            enabled: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.trim().is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}
