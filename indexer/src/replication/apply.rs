use std::fmt;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::IndexerResult;
use crate::metrics::{
    INDEXER_EVENT_ERRORS_TOTAL, INDEXER_EVENTS_SKIPPED_TOTAL, OPERATION_LABEL, REASON_LABEL,
    SKIP_REASON_BELOW_THRESHOLD, SKIP_REASON_LOGICALLY_DELETED, SKIP_REASON_UNCHANGED_DELETED,
};
use crate::reference::ReferenceData;
use crate::replication::stream::ChangeStream;
use crate::store::IndexStore;
use crate::types::{ChangeEvent, DELETED_STATUS, ReleaseColumns, ReleaseRecord, RowChange};
use crate::writer::{IndexWriter, Mutation, WriteOutcome};

/// Why an event of the monitored table did not produce a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Insert of an id below the replay-skip threshold.
    BelowThreshold,
    /// Insert of a row that is already logically deleted.
    LogicallyDeleted,
    /// Update of a row that was and stays logically deleted.
    UnchangedDeleted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::BelowThreshold => SKIP_REASON_BELOW_THRESHOLD,
            SkipReason::LogicallyDeleted => SKIP_REASON_LOGICALLY_DELETED,
            SkipReason::UnchangedDeleted => SKIP_REASON_UNCHANGED_DELETED,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with one change event.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Apply(Mutation),
    Skip(SkipReason),
}

/// Decides the index mutation for an event of the monitored table.
///
/// Rows with status [`DELETED_STATUS`] never exist in the index. The threshold only applies to
/// inserts; updates and deletes always go through. A missing or null status counts as `0`.
pub fn classify(event: &ChangeEvent, replay_skip_threshold: i64) -> IndexerResult<Decision> {
    match &event.change {
        RowChange::Delete { values } => {
            let id = ReleaseRecord::id_of(values)?;
            Ok(Decision::Apply(Mutation::Delete(id)))
        }
        RowChange::Insert { values } => {
            let id = ReleaseRecord::id_of(values)?;
            if id < replay_skip_threshold {
                return Ok(Decision::Skip(SkipReason::BelowThreshold));
            }

            if ReleaseRecord::status_of(values)? == DELETED_STATUS {
                return Ok(Decision::Skip(SkipReason::LogicallyDeleted));
            }

            Ok(Decision::Apply(Mutation::Upsert(ReleaseRecord::from_row(
                values,
            )?)))
        }
        RowChange::Update {
            before_values,
            after_values,
        } => {
            let was_deleted = ReleaseRecord::status_of(before_values)? == DELETED_STATUS;
            let is_deleted = ReleaseRecord::status_of(after_values)? == DELETED_STATUS;

            match (was_deleted, is_deleted) {
                (false, true) => Ok(Decision::Apply(Mutation::Delete(ReleaseRecord::id_of(
                    after_values,
                )?))),
                // Leaving the deleted state and a plain update of a live row both re-upsert the
                // full record.
                (true, false) | (false, false) => Ok(Decision::Apply(Mutation::Upsert(
                    ReleaseRecord::from_row(after_values)?,
                ))),
                (true, true) => Ok(Decision::Skip(SkipReason::UnchangedDeleted)),
            }
        }
    }
}

/// Result of handling one change event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied(Mutation),
    Skipped(SkipReason),
    /// The event could not be translated or its mutation failed. It is not retried.
    Failed,
}

/// Counters of the events handled by a consume loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    pub received: u64,
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl ConsumeStats {
    fn record(&mut self, outcome: &EventOutcome) {
        self.received += 1;
        match outcome {
            EventOutcome::Applied(_) => self.applied += 1,
            EventOutcome::Skipped(_) => self.skipped += 1,
            EventOutcome::Failed => self.failed += 1,
        }
    }
}

/// Translates change events into index mutations and applies them.
#[derive(Debug, Clone)]
pub struct EventApplier<S> {
    writer: IndexWriter<S>,
    replay_skip_threshold: i64,
    reference_data: Arc<ReferenceData>,
}

impl<S> EventApplier<S>
where
    S: IndexStore,
{
    pub fn new(
        writer: IndexWriter<S>,
        replay_skip_threshold: i64,
        reference_data: Arc<ReferenceData>,
    ) -> Self {
        Self {
            writer,
            replay_skip_threshold,
            reference_data,
        }
    }

    /// Dictionaries loaded at startup, available for enriching records.
    pub fn reference_data(&self) -> &ReferenceData {
        &self.reference_data
    }

    /// Handles one event end to end.
    ///
    /// Never fails: translation and write errors are logged with the event and counted, and the
    /// caller moves on to the next event.
    pub async fn apply_event(&self, event: &ChangeEvent) -> EventOutcome {
        let operation = event.operation();

        let decision = match classify(event, self.replay_skip_threshold) {
            Ok(decision) => decision,
            Err(err) => {
                error!(
                    table = %event.table,
                    %operation,
                    release_id = ?event.current_values().get(ReleaseColumns::ID),
                    error = %err,
                    event = ?event,
                    row = ?event.current_values(),
                    "failed to translate change event, skipping it"
                );
                counter!(INDEXER_EVENT_ERRORS_TOTAL, OPERATION_LABEL => operation.as_str())
                    .increment(1);
                return EventOutcome::Failed;
            }
        };

        let mutation = match decision {
            Decision::Apply(mutation) => mutation,
            Decision::Skip(reason) => {
                debug!(
                    table = %event.table,
                    %operation,
                    release_id = ?event.current_values().get(ReleaseColumns::ID),
                    %reason,
                    "change event produces no mutation"
                );
                counter!(INDEXER_EVENTS_SKIPPED_TOTAL, REASON_LABEL => reason.as_str())
                    .increment(1);
                return EventOutcome::Skipped(reason);
            }
        };

        match self.writer.apply(&mutation).await {
            WriteOutcome::Applied => EventOutcome::Applied(mutation),
            WriteOutcome::Failed => {
                error!(
                    table = %event.table,
                    %operation,
                    release_id = mutation.release_id(),
                    %mutation,
                    event = ?event,
                    row = ?event.current_values(),
                    "index mutation failed, skipping change event"
                );
                counter!(INDEXER_EVENT_ERRORS_TOTAL, OPERATION_LABEL => operation.as_str())
                    .increment(1);
                EventOutcome::Failed
            }
        }
    }
}

/// Why a consume loop returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeLoopResult {
    /// The source closed the stream.
    StreamEnded,
    /// Shutdown was requested while waiting for the next event.
    ShutdownRequested,
}

/// Reads events from `stream` one at a time and applies each before reading the next.
///
/// Shutdown is only observed while waiting for an event, so the event being applied is always
/// completed. Per-event read errors are logged and skipped. Returns the first stream-level error,
/// leaving the stream to be closed by the caller.
pub async fn start_consume_loop<T, S>(
    stream: &mut T,
    applier: &EventApplier<S>,
    shutdown_rx: &mut ShutdownRx,
    stats: &mut ConsumeStats,
) -> IndexerResult<ConsumeLoopResult>
where
    T: ChangeStream,
    S: IndexStore,
{
    loop {
        let next = tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("shutdown requested, leaving consume loop");
                return Ok(ConsumeLoopResult::ShutdownRequested);
            }

            next = stream.next_event() => next,
        };

        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => {
                info!("change stream closed by the source");
                return Ok(ConsumeLoopResult::StreamEnded);
            }
            Err(err) if err.kind().is_connection_retryable() => return Err(err),
            Err(err) => {
                error!(error = %err, "failed to read change event, skipping it");
                counter!(INDEXER_EVENT_ERRORS_TOTAL, OPERATION_LABEL => "unknown").increment(1);
                stats.received += 1;
                stats.failed += 1;
                continue;
            }
        };

        let outcome = applier.apply_event(&event).await;
        stats.record(&outcome);
    }
}
