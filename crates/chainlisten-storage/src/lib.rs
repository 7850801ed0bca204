//! chainlisten-storage — durable checkpoint backends for ChainListen.
//!
//! Backends:
//! - [`file`]: YAML document on local disk, replaced atomically on save
//! - in-memory storage lives in `chainlisten_core::checkpoint` for tests

pub mod file;

pub use file::YamlFileStorage;
