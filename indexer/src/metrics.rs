//! Metrics definitions for indexer monitoring.

use metrics::{Unit, describe_counter};

/// Label for the operation kind of a change event.
pub const OPERATION_LABEL: &str = "operation";

/// Label for the reason an event produced no mutation.
pub const REASON_LABEL: &str = "reason";

/// Label for the index mutation kind.
pub const MUTATION_LABEL: &str = "mutation";

/// Label for the outcome of an index write.
pub const OUTCOME_LABEL: &str = "outcome";

/// Counter for change events received from the stream.
pub const INDEXER_EVENTS_RECEIVED_TOTAL: &str = "indexer_events_received_total";

/// Counter for change events that were intentionally not applied.
pub const INDEXER_EVENTS_SKIPPED_TOTAL: &str = "indexer_events_skipped_total";

/// Counter for mutations sent to the index store.
pub const INDEXER_INDEX_WRITES_TOTAL: &str = "indexer_index_writes_total";

/// Counter for change events dropped because of an error.
pub const INDEXER_EVENT_ERRORS_TOTAL: &str = "indexer_event_errors_total";

/// Counter for reopened change-stream connections.
pub const INDEXER_STREAM_RECONNECTIONS_TOTAL: &str = "indexer_stream_reconnections_total";

pub const SKIP_REASON_OTHER_TABLE: &str = "other_table";
pub const SKIP_REASON_BELOW_THRESHOLD: &str = "below_threshold";
pub const SKIP_REASON_LOGICALLY_DELETED: &str = "logically_deleted";
pub const SKIP_REASON_UNCHANGED_DELETED: &str = "unchanged_deleted";

pub const OUTCOME_APPLIED: &str = "applied";
pub const OUTCOME_FAILED: &str = "failed";

/// Registers metric descriptions with the global metrics recorder.
///
/// Without an installed recorder this is a no-op.
pub fn register_metrics() {
    describe_counter!(
        INDEXER_EVENTS_RECEIVED_TOTAL,
        Unit::Count,
        "Change events received from the change stream"
    );
    describe_counter!(
        INDEXER_EVENTS_SKIPPED_TOTAL,
        Unit::Count,
        "Change events that produced no index mutation"
    );
    describe_counter!(
        INDEXER_INDEX_WRITES_TOTAL,
        Unit::Count,
        "Replace and delete statements sent to the index"
    );
    describe_counter!(
        INDEXER_EVENT_ERRORS_TOTAL,
        Unit::Count,
        "Change events skipped because they could not be translated"
    );
    describe_counter!(
        INDEXER_STREAM_RECONNECTIONS_TOTAL,
        Unit::Count,
        "Change stream connections reopened after a failure"
    );
}
