use std::sync::Arc;

use indexer_config::shared::{PipelineConfig, ReconnectionConfig};
use tracing::{error, info};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::IndexerResult;
use crate::reference::{ReferenceData, ReferenceSource};
use crate::replication::apply::{ConsumeLoopResult, ConsumeStats, EventApplier};
use crate::replication::reconnect::reconnection_loop;
use crate::replication::stream::{ChangeStreamSource, StreamRequest};
use crate::store::IndexStore;
use crate::writer::IndexWriter;

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub result: ConsumeLoopResult,
    pub stats: ConsumeStats,
    /// Number of documents in the index when the pipeline started.
    pub initial_document_count: u64,
}

/// Keeps the index in sync with the monitored table.
///
/// [`Pipeline::run`] performs the startup sequence and then consumes the change stream:
///
/// 1. Probes the index with a count query.
/// 2. Loads the reference dictionaries, which must meet their minimum sizes.
/// 3. Opens the change stream at the tail and applies events in order until the source closes
///    it or shutdown is requested.
///
/// A failure in steps 1 or 2 aborts before any event is read.
#[derive(Debug)]
pub struct Pipeline<S, R, C> {
    config: PipelineConfig,
    reconnection: ReconnectionConfig,
    store: S,
    reference_source: R,
    stream_source: C,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<S, R, C> Pipeline<S, R, C>
where
    S: IndexStore,
    R: ReferenceSource,
    C: ChangeStreamSource,
{
    pub fn new(
        config: PipelineConfig,
        reconnection: ReconnectionConfig,
        store: S,
        reference_source: R,
        stream_source: C,
    ) -> Self {
        // The receiver is kept from creation on, so a shutdown requested before `run` is seen.
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Self {
            config,
            reconnection,
            store,
            reference_source,
            stream_source,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!("failed to send shutdown signal to the pipeline: {}", err);
            return;
        }

        info!("shut down signal successfully sent");
    }

    pub async fn run(self) -> IndexerResult<PipelineReport> {
        info!(
            table = %self.config.table_name,
            replay_skip_threshold = self.config.replay_skip_threshold,
            store = S::name(),
            "starting indexer pipeline"
        );

        let writer = IndexWriter::new(self.store);

        let initial_document_count = match writer.probe().await {
            Ok(count) => {
                info!(documents = count, "index connection test successful");
                count
            }
            Err(err) => {
                error!(error = %err, "index connection test failed, aborting startup");
                return Err(err);
            }
        };

        let reference_data =
            match ReferenceData::load(&self.reference_source, &self.config.reference).await {
                Ok(reference_data) => reference_data,
                Err(err) => {
                    error!(error = %err, "failed to cache reference tables, aborting startup");
                    return Err(err);
                }
            };

        info!(
            groups = reference_data.groups.len(),
            sections = reference_data.sections.len(),
            "initialization complete, starting change stream consumption"
        );

        let applier = EventApplier::new(
            writer,
            self.config.replay_skip_threshold,
            Arc::new(reference_data),
        );
        let request = StreamRequest::tail(self.config.table_name.clone());
        let mut stats = ConsumeStats::default();

        let result = reconnection_loop(
            &self.stream_source,
            &request,
            &self.reconnection,
            &applier,
            self.shutdown_rx,
            &mut stats,
        )
        .await;

        match result {
            Ok(result) => {
                info!(
                    ?result,
                    received = stats.received,
                    applied = stats.applied,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    "indexer pipeline stopped"
                );

                Ok(PipelineReport {
                    result,
                    stats,
                    initial_document_count,
                })
            }
            Err(err) => {
                error!(
                    error = %err,
                    received = stats.received,
                    "indexer pipeline failed"
                );
                Err(err)
            }
        }
    }
}
