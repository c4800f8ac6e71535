use std::io;
use std::time::Duration;

use indexer_config::shared::StreamConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

use crate::error::{ErrorKind, IndexerResult};
use crate::replication::stream::{ChangeStream, ChangeStreamSource, StreamRequest};
use crate::types::ChangeEvent;
use crate::{bail, indexer_error};

/// Opens change streams from a reader service over TCP.
///
/// The service tails the binary log of the source database and emits one JSON encoded
/// [`ChangeEvent`] per line. After connecting, the subscription is sent as a single JSON line.
#[derive(Debug, Clone)]
pub struct TcpChangeStreamSource {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpChangeStreamSource {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout(),
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ChangeStreamSource for TcpChangeStreamSource {
    type Stream = JsonLinesChangeStream<OwnedReadHalf, OwnedWriteHalf>;

    async fn open(&self, request: &StreamRequest) -> IndexerResult<Self::Stream> {
        let address = self.address();

        let connection =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
                Ok(Ok(connection)) => connection,
                Ok(Err(err)) => bail!(
                    ErrorKind::StreamConnectionFailed,
                    "Failed to connect to the change stream",
                    format!("{address}: {err}"),
                    source: err
                ),
                Err(_) => bail!(
                    ErrorKind::StreamConnectionFailed,
                    "Timed out connecting to the change stream",
                    format!("{address} after {}ms", self.connect_timeout.as_millis())
                ),
            };

        connection.set_nodelay(true).map_err(stream_io_error)?;
        let (reader, writer) = connection.into_split();

        let stream = JsonLinesChangeStream::subscribe(reader, writer, request).await?;
        info!(%address, table = %request.table, "opened change stream");

        Ok(stream)
    }
}

/// Change stream reading newline-delimited JSON events.
#[derive(Debug)]
pub struct JsonLinesChangeStream<R, W> {
    reader: BufReader<R>,
    writer: W,
    line: String,
    line_number: u64,
}

impl<R, W> JsonLinesChangeStream<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Sends `request` as one JSON line and returns the stream of the events that follow.
    pub async fn subscribe(
        reader: R,
        mut writer: W,
        request: &StreamRequest,
    ) -> IndexerResult<Self> {
        let mut subscription = serde_json::to_vec(request).map_err(|err| {
            indexer_error!(
                ErrorKind::SerializationError,
                "Failed to encode the stream subscription",
                err.to_string(),
                source: err
            )
        })?;
        subscription.push(b'\n');

        writer.write_all(&subscription).await.map_err(stream_io_error)?;
        writer.flush().await.map_err(stream_io_error)?;

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            line: String::new(),
            line_number: 0,
        })
    }
}

impl<R, W> ChangeStream for JsonLinesChangeStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_event(&mut self) -> IndexerResult<Option<ChangeEvent>> {
        loop {
            self.line.clear();
            self.line_number += 1;

            let read = match self.reader.read_line(&mut self.line).await {
                Ok(read) => read,
                // The invalid line is consumed, the next one can still be read.
                Err(err) if err.kind() == io::ErrorKind::InvalidData => bail!(
                    ErrorKind::DeserializationError,
                    "Change stream line is not valid UTF-8",
                    format!("line {}: {err}", self.line_number),
                    source: err
                ),
                Err(err) => return Err(stream_io_error(err)),
            };

            if read == 0 {
                debug!(lines = self.line_number - 1, "change stream reached end of input");
                return Ok(None);
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            return match serde_json::from_str::<ChangeEvent>(line) {
                Ok(event) => Ok(Some(event)),
                Err(err) => Err(indexer_error!(
                    ErrorKind::DeserializationError,
                    "Malformed change event",
                    format!("line {}: {err}: {line}", self.line_number),
                    source: err
                )),
            };
        }
    }

    async fn close(&mut self) -> IndexerResult<()> {
        self.writer.shutdown().await.map_err(stream_io_error)
    }
}

fn stream_io_error(err: io::Error) -> crate::error::IndexerError {
    indexer_error!(
        ErrorKind::StreamIoError,
        "Change stream I/O failed",
        err.to_string(),
        source: err
    )
}
