use indexer::pipeline::{Pipeline, PipelineReport};
use indexer::reference::{MySqlReferenceSource, ReferenceSource};
use indexer::replication::stream::ChangeStreamSource;
use indexer::replication::tcp::TcpChangeStreamSource;
use indexer::store::IndexStore;
use indexer::store::sphinx::SphinxIndexStore;
use indexer_config::shared::IndexerConfig;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::error::ServiceResult;

/// Starts the indexer with the provided configuration and runs it until the change stream ends,
/// a shutdown signal arrives or a fatal error occurs.
pub async fn start_indexer_with_config(config: IndexerConfig) -> ServiceResult<()> {
    info!("starting indexer service");

    log_config(&config);

    let store = SphinxIndexStore::new(&config.index)?;
    let reference_source = MySqlReferenceSource::new(config.source);
    let stream_source = TcpChangeStreamSource::new(&config.stream);

    let pipeline = Pipeline::new(
        config.pipeline,
        config.stream.reconnection,
        store.clone(),
        reference_source,
        stream_source,
    );
    let result = start_pipeline(pipeline).await;

    store.close().await;

    let report = result?;
    info!(
        result = ?report.result,
        initial_documents = report.initial_document_count,
        applied = report.stats.applied,
        "indexer service completed"
    );

    Ok(())
}

fn log_config(config: &IndexerConfig) {
    info!(
        host = %config.source.host,
        port = config.source.port,
        database = %config.source.name,
        tls_enabled = config.source.tls.enabled,
        "source config"
    );
    info!(
        host = %config.index.host,
        port = config.index.port,
        index = %config.index.index_name,
        max_connections = config.index.max_connections,
        "index config"
    );
    info!(
        host = %config.stream.host,
        port = config.stream.port,
        connect_timeout_ms = config.stream.connect_timeout_ms,
        reconnection_enabled = config.stream.reconnection.enabled,
        "stream config"
    );
    info!(
        table = %config.pipeline.table_name,
        replay_skip_threshold = config.pipeline.replay_skip_threshold,
        min_groups = config.pipeline.reference.min_groups,
        min_sections = config.pipeline.reference.min_sections,
        "pipeline config"
    );
}

async fn start_pipeline<S, R, C>(pipeline: Pipeline<S, R, C>) -> ServiceResult<PipelineReport>
where
    S: IndexStore,
    R: ReferenceSource,
    C: ChangeStreamSource,
{
    // Spawn a task to listen for shutdown signals and trigger shutdown.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("sigint (ctrl+c) received, shutting down pipeline");
                    }
                    _ = sigterm.recv() => {
                        info!("sigterm received, shutting down pipeline");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to register sigterm handler, listening for ctrl+c only");
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "failed to listen for ctrl+c");
                    return;
                }
                info!("sigint (ctrl+c) received, shutting down pipeline");
            }
        }

        if let Err(err) = shutdown_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
        }
    });

    let result = pipeline.run().await;

    // The pipeline may finish before any signal arrives.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    Ok(result?)
}
