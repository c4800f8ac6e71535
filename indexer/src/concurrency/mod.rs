//! Coordination primitives shared by the pipeline and its callers.
//!
//! The indexer runs a single consumer, so the only primitive needed is the [`shutdown`] signal:
//! a watch channel that the consume loop checks between events.

pub mod shutdown;
