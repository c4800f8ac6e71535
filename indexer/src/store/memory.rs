use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, IndexerResult};
use crate::store::base::IndexStore;
use crate::types::{ReleaseId, ReleaseRecord};

/// A call received by a [`MemoryIndexStore`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexCall {
    Replace(ReleaseRecord),
    Delete(ReleaseId),
    Count,
}

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<ReleaseId, ReleaseRecord>,
    calls: Vec<IndexCall>,
    failing_ids: HashSet<ReleaseId>,
    unreachable: bool,
}

/// In-memory index store for testing and development.
///
/// Documents are kept in a map keyed by release id. Every call is recorded, including the ones
/// that fail, so tests can assert on how many mutations an event produced. Failures can be
/// injected per release id or for the whole store.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `records`, as left by a previous bulk load.
    pub fn with_documents(records: impl IntoIterator<Item = ReleaseRecord>) -> Self {
        let documents = records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        Self {
            inner: Arc::new(Mutex::new(Inner {
                documents,
                ..Inner::default()
            })),
        }
    }

    pub async fn document(&self, id: ReleaseId) -> Option<ReleaseRecord> {
        self.inner.lock().await.documents.get(&id).cloned()
    }

    pub async fn documents(&self) -> BTreeMap<ReleaseId, ReleaseRecord> {
        self.inner.lock().await.documents.clone()
    }

    pub async fn calls(&self) -> Vec<IndexCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Returns the number of replace and delete calls received.
    pub async fn mutation_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| !matches!(call, IndexCall::Count))
            .count()
    }

    /// Makes every mutation of `id` fail until [`MemoryIndexStore::clear_failures`] is called.
    pub async fn fail_writes_for(&self, id: ReleaseId) {
        self.inner.lock().await.failing_ids.insert(id);
    }

    /// Makes every call fail with a connection error.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().await.unreachable = unreachable;
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing_ids.clear();
        inner.unreachable = false;
    }
}

impl Inner {
    fn check(&self, id: Option<ReleaseId>) -> IndexerResult<()> {
        if self.unreachable {
            bail!(
                ErrorKind::IndexConnectionFailed,
                "Index is unreachable",
                "memory store marked as unreachable"
            );
        }

        if let Some(id) = id
            && self.failing_ids.contains(&id)
        {
            bail!(
                ErrorKind::IndexQueryFailed,
                "Index statement failed",
                format!("injected failure for release {id}")
            );
        }

        Ok(())
    }
}

impl IndexStore for MemoryIndexStore {
    fn name() -> &'static str {
        "memory"
    }

    async fn replace(&self, record: &ReleaseRecord) -> IndexerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(IndexCall::Replace(record.clone()));
        inner.check(Some(record.id))?;

        info!(release_id = record.id, "replacing document in memory");
        inner.documents.insert(record.id, record.clone());

        Ok(())
    }

    async fn delete(&self, id: ReleaseId) -> IndexerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(IndexCall::Delete(id));
        inner.check(Some(id))?;

        info!(release_id = id, "deleting document from memory");
        inner.documents.remove(&id);

        Ok(())
    }

    async fn count(&self) -> IndexerResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(IndexCall::Count);
        inner.check(None)?;

        Ok(inner.documents.len() as u64)
    }
}
