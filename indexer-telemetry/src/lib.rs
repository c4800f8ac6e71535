//! Logging and metrics initialization shared by the indexer binaries and tests.

pub mod metrics;
pub mod tracing;
