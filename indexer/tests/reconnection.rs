mod common;

use indexer::error::{ErrorKind, IndexerError};
use indexer::pipeline::Pipeline;
use indexer::replication::apply::ConsumeLoopResult;
use indexer::store::memory::MemoryIndexStore;
use indexer_config::shared::ReconnectionConfig;
use indexer_telemetry::tracing::init_test_tracing;

use crate::common::{
    Connection, ScriptedStreamSource, StaticReferenceSource, Step, create_pipeline,
    expected_record, fast_reconnection, insert, pipeline_config, update,
};

fn connection_lost() -> Step {
    Step::Error(IndexerError::from((
        ErrorKind::StreamIoError,
        "Change stream I/O failed",
    )))
}

fn pipeline_with_reconnection(
    reconnection: ReconnectionConfig,
    store: MemoryIndexStore,
    source: ScriptedStreamSource,
) -> Pipeline<MemoryIndexStore, StaticReferenceSource, ScriptedStreamSource> {
    Pipeline::new(
        pipeline_config(60),
        reconnection,
        store,
        StaticReferenceSource::complete(),
        source,
    )
}

#[tokio::test]
async fn lost_connection_is_reopened_and_consumption_resumes() {
    init_test_tracing();

    let store = MemoryIndexStore::new();
    let source = ScriptedStreamSource::new(vec![
        Connection::Steps(vec![Step::Event(insert(100, 0)), connection_lost()]),
        Connection::Steps(vec![Step::Event(update(100, 0, 4)), Step::Event(insert(101, 0))]),
    ]);

    let report = create_pipeline(
        60,
        store.clone(),
        StaticReferenceSource::complete(),
        source.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.result, ConsumeLoopResult::StreamEnded);
    assert_eq!(report.stats.applied, 3);
    assert_eq!(source.open_count(), 2);
    assert_eq!(source.closed_count(), 2);
    assert!(store.document(100).await.is_none());
    assert_eq!(store.document(101).await, Some(expected_record(101, 0)));
}

#[tokio::test]
async fn failed_opens_are_retried() {
    init_test_tracing();

    let store = MemoryIndexStore::new();
    let source = ScriptedStreamSource::new(vec![
        Connection::Fails(ErrorKind::StreamConnectionFailed),
        Connection::Fails(ErrorKind::StreamConnectionFailed),
        Connection::Steps(vec![Step::Event(insert(100, 0))]),
    ]);

    let report = create_pipeline(
        60,
        store.clone(),
        StaticReferenceSource::complete(),
        source.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.result, ConsumeLoopResult::StreamEnded);
    assert_eq!(source.open_count(), 3);
    assert_eq!(source.closed_count(), 1);
    assert!(store.document(100).await.is_some());
}

#[tokio::test]
async fn stream_failure_is_fatal_when_reconnection_is_disabled() {
    init_test_tracing();

    let store = MemoryIndexStore::new();
    let source = ScriptedStreamSource::new(vec![
        Connection::Steps(vec![Step::Event(insert(100, 0)), connection_lost()]),
        Connection::Steps(vec![Step::Event(insert(101, 0))]),
    ]);

    let err = pipeline_with_reconnection(
        ReconnectionConfig {
            enabled: false,
            ..fast_reconnection()
        },
        store.clone(),
        source.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StreamIoError);
    assert_eq!(source.open_count(), 1);
    assert_eq!(source.closed_count(), 1);
    assert!(store.document(100).await.is_some());
    assert!(store.document(101).await.is_none());
}

#[tokio::test]
async fn non_retryable_open_error_is_fatal() {
    init_test_tracing();

    let source = ScriptedStreamSource::new(vec![
        Connection::Fails(ErrorKind::ConfigError),
        Connection::Steps(vec![Step::Event(insert(100, 0))]),
    ]);

    let err = create_pipeline(
        60,
        MemoryIndexStore::new(),
        StaticReferenceSource::complete(),
        source.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(source.open_count(), 1);
}

#[tokio::test]
async fn retries_stop_after_max_retry_duration() {
    init_test_tracing();

    let source = ScriptedStreamSource::new(vec![
        Connection::Fails(ErrorKind::StreamConnectionFailed),
        Connection::Fails(ErrorKind::StreamConnectionFailed),
        Connection::Steps(vec![Step::Event(insert(100, 0))]),
    ]);

    let err = pipeline_with_reconnection(
        ReconnectionConfig {
            max_retry_duration_ms: 0,
            ..fast_reconnection()
        },
        MemoryIndexStore::new(),
        source.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StreamConnectionFailed);
    assert_eq!(source.open_count(), 2);
}

#[tokio::test]
async fn shutdown_interrupts_the_backoff() {
    init_test_tracing();

    let source = ScriptedStreamSource::new(vec![
        Connection::Fails(ErrorKind::StreamConnectionFailed),
        Connection::Steps(vec![Step::Event(insert(100, 0))]),
    ]);
    let store = MemoryIndexStore::new();

    let pipeline = pipeline_with_reconnection(
        ReconnectionConfig {
            initial_retry_delay_ms: 60_000,
            max_retry_delay_ms: 60_000,
            ..fast_reconnection()
        },
        store.clone(),
        source.clone(),
    );
    let shutdown_tx = pipeline.shutdown_tx();
    let handle = tokio::spawn(pipeline.run());

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while source.open_count() < 1 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    shutdown_tx.shutdown().unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.result, ConsumeLoopResult::ShutdownRequested);
    assert_eq!(source.open_count(), 1);
    assert_eq!(store.mutation_count().await, 0);
}
