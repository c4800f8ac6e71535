use std::future::Future;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IndexerResult;
use crate::metrics::{
    INDEXER_EVENTS_RECEIVED_TOTAL, INDEXER_EVENTS_SKIPPED_TOTAL, OPERATION_LABEL, REASON_LABEL,
    SKIP_REASON_OTHER_TABLE,
};
use crate::types::{ChangeEvent, OperationKind};

/// Where a newly opened stream starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPosition {
    /// Only changes committed after the stream is opened.
    Tail,
}

/// Subscription sent to the change-stream source when opening a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub table: String,
    pub operations: Vec<OperationKind>,
    pub position: StreamPosition,
}

impl StreamRequest {
    /// Requests every operation kind of `table`, starting at the current tail.
    pub fn tail(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operations: OperationKind::ALL.to_vec(),
            position: StreamPosition::Tail,
        }
    }
}

/// An open, ordered sequence of change events.
///
/// Errors whose kind is [connection retryable](crate::error::ErrorKind::is_connection_retryable)
/// mean the stream is broken and must be reopened. Any other error concerns a single event and
/// the stream can be read further.
pub trait ChangeStream {
    /// Returns the next event, or `None` once the source closed the stream.
    fn next_event(&mut self) -> impl Future<Output = IndexerResult<Option<ChangeEvent>>> + Send;

    /// Releases the underlying connection.
    fn close(&mut self) -> impl Future<Output = IndexerResult<()>> + Send;
}

/// Opens change streams.
pub trait ChangeStreamSource {
    type Stream: ChangeStream + Send;

    fn open(
        &self,
        request: &StreamRequest,
    ) -> impl Future<Output = IndexerResult<Self::Stream>> + Send;
}

/// Wraps a stream and drops events that do not match the request.
///
/// Sources are asked to only send matching events, this guarantees it.
#[derive(Debug)]
pub struct FilteredChangeStream<S> {
    inner: S,
    request: StreamRequest,
}

impl<S> FilteredChangeStream<S> {
    pub fn new(inner: S, request: StreamRequest) -> Self {
        Self { inner, request }
    }
}

impl<S> ChangeStream for FilteredChangeStream<S>
where
    S: ChangeStream + Send,
{
    async fn next_event(&mut self) -> IndexerResult<Option<ChangeEvent>> {
        loop {
            let Some(event) = self.inner.next_event().await? else {
                return Ok(None);
            };

            let operation = event.operation();
            counter!(INDEXER_EVENTS_RECEIVED_TOTAL, OPERATION_LABEL => operation.as_str())
                .increment(1);

            if event.table != self.request.table {
                debug!(table = %event.table, %operation, "skipping event of another table");
                counter!(INDEXER_EVENTS_SKIPPED_TOTAL, REASON_LABEL => SKIP_REASON_OTHER_TABLE)
                    .increment(1);
                continue;
            }

            if !self.request.operations.contains(&operation) {
                debug!(table = %event.table, %operation, "skipping unrequested operation");
                continue;
            }

            return Ok(Some(event));
        }
    }

    async fn close(&mut self) -> IndexerResult<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::types::Row;

    struct VecStream(VecDeque<ChangeEvent>);

    impl ChangeStream for VecStream {
        async fn next_event(&mut self) -> IndexerResult<Option<ChangeEvent>> {
            Ok(self.0.pop_front())
        }

        async fn close(&mut self) -> IndexerResult<()> {
            Ok(())
        }
    }

    fn row(id: i64) -> Row {
        Row::new().with("id", id)
    }

    #[tokio::test]
    async fn drops_other_tables_and_operations() {
        let events = VecDeque::from(vec![
            ChangeEvent::insert("groups", row(1)),
            ChangeEvent::insert("releases", row(2)),
            ChangeEvent::delete("releases", row(3)),
            ChangeEvent::update("releases", row(4), row(4)),
        ]);
        let request = StreamRequest {
            operations: vec![OperationKind::Insert, OperationKind::Update],
            ..StreamRequest::tail("releases")
        };
        let mut stream = FilteredChangeStream::new(VecStream(events), request);

        let first = stream.next_event().await.unwrap().unwrap();
        assert_eq!(first, ChangeEvent::insert("releases", row(2)));

        let second = stream.next_event().await.unwrap().unwrap();
        assert_eq!(second.operation(), OperationKind::Update);

        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[test]
    fn tail_request_serializes_as_subscription() {
        let json = serde_json::to_string(&StreamRequest::tail("releases")).unwrap();

        assert_eq!(
            json,
            r#"{"table":"releases","operations":["insert","update","delete"],"position":"tail"}"#
        );
    }
}
