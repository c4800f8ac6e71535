//! Consumption of the change stream.
//!
//! - [`stream`] defines the change-stream interfaces and the table/operation filter.
//! - [`tcp`] implements them over a newline-delimited JSON connection to a reader service.
//! - [`apply`] classifies events into index mutations and runs the consume loop.
//! - [`reconnect`] reopens the stream with backoff when the connection fails.

pub mod apply;
pub mod reconnect;
pub mod stream;
pub mod tcp;
