use std::future::Future;

use crate::error::IndexerResult;
use crate::types::{ReleaseId, ReleaseRecord};

/// Trait for real-time indexes that mirror the releases table.
///
/// Both mutations are keyed by the release id and must be idempotent: replacing the same record
/// twice leaves the same document, deleting an absent id succeeds.
pub trait IndexStore {
    /// Returns the name of the store, used in logs.
    fn name() -> &'static str;

    /// Inserts the document for `record.id`, fully overwriting an existing one.
    fn replace(&self, record: &ReleaseRecord) -> impl Future<Output = IndexerResult<()>> + Send;

    /// Removes the document with `id` if present.
    fn delete(&self, id: ReleaseId) -> impl Future<Output = IndexerResult<()>> + Send;

    /// Returns the number of documents in the index.
    ///
    /// Used as a read-only reachability probe before consuming events.
    fn count(&self) -> impl Future<Output = IndexerResult<u64>> + Send;
}
