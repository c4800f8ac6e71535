//! Indexer service binary.
//!
//! Loads the configuration, initializes logging and metrics, and runs the pipeline that keeps
//! the real-time index in sync with the monitored table until the stream ends or a shutdown
//! signal arrives.

use std::process::ExitCode;

use indexer_config::Environment;
use indexer_config::shared::IndexerConfig;
use indexer_telemetry::metrics::init_metrics;
use indexer_telemetry::tracing::init_tracing;
use tracing::{error, info};

use crate::config::load_indexer_config;
use crate::core::start_indexer_with_config;
use crate::error::{ServiceError, ServiceResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> ServiceResult<()> {
    let config = load_indexer_config()?;
    let environment = Environment::load()?;

    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), environment).map_err(ServiceError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))
}

async fn async_main(config: IndexerConfig) -> ServiceResult<()> {
    if config.metrics.enabled {
        init_metrics(&config.index.index_name).map_err(ServiceError::config)?;
        indexer::metrics::register_metrics();
    } else {
        info!("metrics disabled, skipping prometheus exporter");
    }

    if let Err(err) = start_indexer_with_config(config).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
