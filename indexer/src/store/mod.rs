//! Index store abstraction and implementations.
//!
//! [`base::IndexStore`] is the raw, error-returning interface to the real-time index.
//! [`sphinx::SphinxIndexStore`] talks SphinxQL over the MySQL protocol and
//! [`memory::MemoryIndexStore`] keeps documents in memory for tests.

pub mod base;
pub mod memory;
pub mod sphinx;
pub mod sphinxql;

pub use base::IndexStore;
