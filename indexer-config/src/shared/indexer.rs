use serde::Deserialize;

use crate::shared::{
    IndexConnectionConfig, MetricsConfig, PipelineConfig, SourceConnectionConfig, StreamConfig,
    ValidationError,
};

/// Complete configuration of the indexer service.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking the secrets it
/// holds.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Source database, read for the reference tables.
    pub source: SourceConnectionConfig,
    /// Real-time index receiving the mutations.
    pub index: IndexConnectionConfig,
    /// Change-stream reader delivering the row events.
    pub stream: StreamConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IndexerConfig {
    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.index.validate()?;
        self.stream.validate()?;
        self.pipeline.validate()
    }
}
