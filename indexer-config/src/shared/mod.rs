//! Shared configuration types for the indexer.

mod base;
mod connection;
mod indexer;
mod metrics;
mod pipeline;
mod reconnection;
mod stream;

pub use base::ValidationError;
pub use connection::{IndexConnectionConfig, SourceConnectionConfig, TlsConfig};
pub use indexer::IndexerConfig;
pub use metrics::MetricsConfig;
pub use pipeline::{PipelineConfig, ReferenceConfig};
pub use reconnection::ReconnectionConfig;
pub use stream::StreamConfig;
