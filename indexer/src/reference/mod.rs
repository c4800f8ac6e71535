//! Reference dictionaries loaded once at startup.
//!
//! The group and section tables act as a startup health gate: each must return at least a
//! configured number of rows, otherwise the indexer does not start. The loaded
//! [`ReferenceData`] is immutable afterwards.

mod cache;
mod source;

pub use cache::{Dictionary, ReferenceData};
pub use source::{GROUPS_TABLE, MySqlReferenceSource, ReferenceSource, SECTIONS_TABLE};
