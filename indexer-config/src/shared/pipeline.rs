use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the change-event to index-mutation pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source table whose changes are mirrored into the index.
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Insert events with an id below this value are ignored.
    ///
    /// Rows below the threshold are expected to be present from a prior bulk load. Update
    /// and delete events are never filtered by it.
    pub replay_skip_threshold: i64,
    #[serde(default)]
    pub reference: ReferenceConfig,
}

impl PipelineConfig {
    pub const DEFAULT_TABLE_NAME: &'static str = "releases";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table_name.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.table_name".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn default_table_name() -> String {
    PipelineConfig::DEFAULT_TABLE_NAME.to_string()
}

/// Minimum row counts the reference tables must reach for startup to proceed.
///
/// A load returning fewer rows is treated as truncated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_min_groups")]
    pub min_groups: usize,
    #[serde(default = "default_min_sections")]
    pub min_sections: usize,
}

impl ReferenceConfig {
    pub const DEFAULT_MIN_GROUPS: usize = 1000;

    pub const DEFAULT_MIN_SECTIONS: usize = 40;
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            min_groups: default_min_groups(),
            min_sections: default_min_sections(),
        }
    }
}

fn default_min_groups() -> usize {
    ReferenceConfig::DEFAULT_MIN_GROUPS
}

fn default_min_sections() -> usize {
    ReferenceConfig::DEFAULT_MIN_SECTIONS
}
