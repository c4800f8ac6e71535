use indexer_config::load_config;
use indexer_config::shared::IndexerConfig;

use crate::error::{ServiceError, ServiceResult};

/// Loads and validates the indexer configuration.
///
/// Uses the hierarchical loader from [`indexer_config`] and validates the resulting
/// [`IndexerConfig`] before returning it.
pub fn load_indexer_config() -> ServiceResult<IndexerConfig> {
    let config = load_config::<IndexerConfig>().map_err(ServiceError::config)?;
    config.validate().map_err(ServiceError::config)?;

    Ok(config)
}
