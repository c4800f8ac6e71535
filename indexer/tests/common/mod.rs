#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexer::error::{ErrorKind, IndexerError, IndexerResult};
use indexer::pipeline::Pipeline;
use indexer::reference::ReferenceSource;
use indexer::replication::stream::{ChangeStream, ChangeStreamSource, StreamRequest};
use indexer::store::IndexStore;
use indexer::store::memory::MemoryIndexStore;
use indexer::types::{Cell, ChangeEvent, ReleaseId, ReleaseRecord, Row};
use indexer_config::shared::{PipelineConfig, ReconnectionConfig, ReferenceConfig};
use tokio::sync::Notify;

pub const TABLE: &str = "releases";

pub const MIN_GROUPS: usize = 10;
pub const MIN_SECTIONS: usize = 4;

/// One step of a scripted stream connection.
#[derive(Debug, Clone)]
pub enum Step {
    Event(ChangeEvent),
    Error(IndexerError),
    /// Blocks until the read is cancelled.
    Pending,
}

/// What the source does on one call to `open`.
#[derive(Debug, Clone)]
pub enum Connection {
    Fails(ErrorKind),
    /// Yields the steps and then reports the end of the stream.
    Steps(Vec<Step>),
}

#[derive(Debug, Default)]
struct SourceState {
    connections: VecDeque<Connection>,
    requests: Vec<StreamRequest>,
}

/// Change-stream source playing back scripted connections.
///
/// Once the script is used up, every open returns a stream that ends immediately.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStreamSource {
    state: Arc<Mutex<SourceState>>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedStreamSource {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState {
                connections: connections.into(),
                requests: Vec::new(),
            })),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source with a single connection yielding `events`.
    pub fn with_events(events: Vec<ChangeEvent>) -> Self {
        Self::new(vec![Connection::Steps(
            events.into_iter().map(Step::Event).collect(),
        )])
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ChangeStreamSource for ScriptedStreamSource {
    type Stream = ScriptedStream;

    async fn open(&self, request: &StreamRequest) -> IndexerResult<Self::Stream> {
        let connection = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            state.connections.pop_front()
        };

        match connection {
            Some(Connection::Fails(kind)) => {
                Err(IndexerError::from((kind, "Scripted connection failure")))
            }
            Some(Connection::Steps(steps)) => Ok(ScriptedStream {
                steps: steps.into(),
                closed: self.closed.clone(),
            }),
            None => Ok(ScriptedStream {
                steps: VecDeque::new(),
                closed: self.closed.clone(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct ScriptedStream {
    steps: VecDeque<Step>,
    closed: Arc<AtomicUsize>,
}

impl ChangeStream for ScriptedStream {
    async fn next_event(&mut self) -> IndexerResult<Option<ChangeEvent>> {
        match self.steps.pop_front() {
            Some(Step::Event(event)) => Ok(Some(event)),
            Some(Step::Error(err)) => Err(err),
            Some(Step::Pending) => {
                self.steps.push_front(Step::Pending);
                std::future::pending().await
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> IndexerResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reference source returning generated dictionaries of fixed sizes.
#[derive(Debug, Clone)]
pub struct StaticReferenceSource {
    groups: usize,
    sections: usize,
    unreachable: bool,
}

impl StaticReferenceSource {
    /// Dictionaries that meet the test minimums.
    pub fn complete() -> Self {
        Self::with_sizes(MIN_GROUPS, MIN_SECTIONS)
    }

    pub fn with_sizes(groups: usize, sections: usize) -> Self {
        Self {
            groups,
            sections,
            unreachable: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::complete()
        }
    }

    fn rows(&self, count: usize, prefix: &str) -> IndexerResult<Vec<(i64, String)>> {
        if self.unreachable {
            return Err(IndexerError::from((
                ErrorKind::SourceConnectionFailed,
                "Database operation failed",
            )));
        }

        Ok((1..=count as i64)
            .map(|id| (id, format!("{prefix}-{id}")))
            .collect())
    }
}

impl ReferenceSource for StaticReferenceSource {
    async fn fetch_groups(&self) -> IndexerResult<Vec<(i64, String)>> {
        self.rows(self.groups, "group")
    }

    async fn fetch_sections(&self) -> IndexerResult<Vec<(i64, String)>> {
        self.rows(self.sections, "section")
    }
}

/// Memory store that announces and delays every replace.
#[derive(Debug, Clone)]
pub struct SlowIndexStore {
    pub inner: MemoryIndexStore,
    pub replace_started: Arc<Notify>,
    delay: Duration,
}

impl SlowIndexStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryIndexStore::new(),
            replace_started: Arc::new(Notify::new()),
            delay,
        }
    }
}

impl IndexStore for SlowIndexStore {
    fn name() -> &'static str {
        "slow-memory"
    }

    async fn replace(&self, record: &ReleaseRecord) -> IndexerResult<()> {
        self.replace_started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.replace(record).await
    }

    async fn delete(&self, id: ReleaseId) -> IndexerResult<()> {
        self.inner.delete(id).await
    }

    async fn count(&self) -> IndexerResult<u64> {
        self.inner.count().await
    }
}

/// A full release row.
pub fn release_row(id: i64, status: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("releasename", format!("Release.{id}-GRP"))
        .with("groupid", 7)
        .with("sectionid", 3)
        .with("status", status)
        .with("pretime", 1_700_000_000)
        .with("size", 350.25)
        .with("files", 12)
}

pub fn expected_record(id: i64, status: i64) -> ReleaseRecord {
    ReleaseRecord {
        id,
        name: format!("Release.{id}-GRP"),
        group_id: 7,
        section_id: 3,
        status,
        pre_time: 1_700_000_000,
        size: 350.25,
        file_count: 12,
    }
}

pub fn insert(id: i64, status: i64) -> ChangeEvent {
    ChangeEvent::insert(TABLE, release_row(id, status))
}

pub fn update(id: i64, before_status: i64, after_status: i64) -> ChangeEvent {
    ChangeEvent::update(
        TABLE,
        release_row(id, before_status),
        release_row(id, after_status),
    )
}

pub fn delete(id: i64) -> ChangeEvent {
    ChangeEvent::delete(TABLE, release_row(id, 0))
}

/// A row carrying only the columns the stream may omit.
pub fn sparse_row(id: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("releasename", format!("Sparse.{id}-GRP"))
        .with("size", Cell::Null)
}

pub fn pipeline_config(replay_skip_threshold: i64) -> PipelineConfig {
    PipelineConfig {
        table_name: TABLE.to_string(),
        replay_skip_threshold,
        reference: ReferenceConfig {
            min_groups: MIN_GROUPS,
            min_sections: MIN_SECTIONS,
        },
    }
}

pub fn fast_reconnection() -> ReconnectionConfig {
    ReconnectionConfig {
        enabled: true,
        initial_retry_delay_ms: 5,
        max_retry_delay_ms: 20,
        backoff_multiplier: 2.0,
        max_retry_duration_ms: 5_000,
    }
}

pub fn create_pipeline<S>(
    replay_skip_threshold: i64,
    store: S,
    reference_source: StaticReferenceSource,
    stream_source: ScriptedStreamSource,
) -> Pipeline<S, StaticReferenceSource, ScriptedStreamSource>
where
    S: IndexStore,
{
    Pipeline::new(
        pipeline_config(replay_skip_threshold),
        fast_reconnection(),
        store,
        reference_source,
        stream_source,
    )
}

/// Waits until `store` received at least `mutations` replace or delete calls.
pub async fn wait_for_mutations(store: &MemoryIndexStore, mutations: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.mutation_count().await < mutations {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for index mutations");
}
