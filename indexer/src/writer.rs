use std::fmt;

use metrics::counter;
use tracing::{error, info};

use crate::error::IndexerResult;
use crate::metrics::{
    INDEXER_INDEX_WRITES_TOTAL, MUTATION_LABEL, OUTCOME_APPLIED, OUTCOME_FAILED, OUTCOME_LABEL,
};
use crate::store::IndexStore;
use crate::types::{ReleaseId, ReleaseRecord};

/// Result of a single index mutation.
///
/// Failures are logged where they happen and never raised past the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Failed,
}

impl WriteOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            WriteOutcome::Applied => OUTCOME_APPLIED,
            WriteOutcome::Failed => OUTCOME_FAILED,
        }
    }
}

/// A mutation of the index decided for one change event.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Upsert(ReleaseRecord),
    Delete(ReleaseId),
}

impl Mutation {
    pub fn release_id(&self) -> ReleaseId {
        match self {
            Mutation::Upsert(record) => record.id,
            Mutation::Delete(id) => *id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mutation::Upsert(_) => "upsert",
            Mutation::Delete(_) => "delete",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.release_id())
    }
}

/// Applies mutations to an [`IndexStore`].
#[derive(Debug, Clone)]
pub struct IndexWriter<S> {
    store: S,
}

impl<S> IndexWriter<S>
where
    S: IndexStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Checks that the index answers a read query and returns its document count.
    ///
    /// Unlike mutations, a failing probe is returned to the caller since it aborts startup.
    pub async fn probe(&self) -> IndexerResult<u64> {
        self.store.count().await
    }

    /// Replaces the document of `record.id` with `record`.
    pub async fn upsert(&self, record: &ReleaseRecord) -> WriteOutcome {
        let outcome = match self.store.replace(record).await {
            Ok(()) => {
                info!(
                    release_id = record.id,
                    release_name = %record.name,
                    store = S::name(),
                    "replaced release"
                );
                WriteOutcome::Applied
            }
            Err(err) => {
                error!(
                    release_id = record.id,
                    release_name = %record.name,
                    store = S::name(),
                    error = %err,
                    "failed to replace release"
                );
                WriteOutcome::Failed
            }
        };

        record_write("upsert", outcome);
        outcome
    }

    /// Deletes the document of `id`. Deleting an absent document is applied.
    pub async fn delete(&self, id: ReleaseId) -> WriteOutcome {
        let outcome = match self.store.delete(id).await {
            Ok(()) => {
                info!(release_id = id, store = S::name(), "deleted release");
                WriteOutcome::Applied
            }
            Err(err) => {
                error!(
                    release_id = id,
                    store = S::name(),
                    error = %err,
                    "failed to delete release"
                );
                WriteOutcome::Failed
            }
        };

        record_write("delete", outcome);
        outcome
    }

    pub async fn apply(&self, mutation: &Mutation) -> WriteOutcome {
        match mutation {
            Mutation::Upsert(record) => self.upsert(record).await,
            Mutation::Delete(id) => self.delete(*id).await,
        }
    }
}

fn record_write(mutation: &'static str, outcome: WriteOutcome) {
    counter!(
        INDEXER_INDEX_WRITES_TOTAL,
        MUTATION_LABEL => mutation,
        OUTCOME_LABEL => outcome.as_label(),
    )
    .increment(1);
}
