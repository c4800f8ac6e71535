//! Configuration for the binlog indexer.
//!
//! Holds the typed configuration tree consumed by the indexer service together with the
//! hierarchical loader that merges configuration files and `APP_` environment overrides.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config, load_config_from};
