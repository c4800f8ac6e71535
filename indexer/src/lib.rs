//! Keeps a Sphinx real-time index in sync with the `releases` table.
//!
//! Row changes arrive as an ordered stream of [`types::ChangeEvent`]s. Each event of the monitored
//! table is classified into at most one idempotent index mutation, keyed by the release id, and
//! applied before the next event is read. Rows whose status marks them as logically deleted never
//! exist in the index.
//!
//! The [`pipeline::Pipeline`] ties the pieces together: it probes the index, loads the
//! [`reference`] dictionaries as a startup gate and then consumes the change stream, reconnecting
//! with backoff when the stream connection fails.

pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod reference;
pub mod replication;
pub mod store;
pub mod types;
pub mod writer;
