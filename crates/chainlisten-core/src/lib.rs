//! chainlisten-core — shared foundation for the ChainListen block listener.
//!
//! # Architecture
//!
//! ```text
//! Supervisor ─┬─ ChannelListener × N  (one per configured channel)
//!             │        ├── BlockSource      (subscription, per channel)
//!             │        ├── BlockExtractor   (block → write records)
//!             │        ├── Publisher        (downstream delivery)
//!             │        └── CheckpointStore  (cursor advance)
//!             └─ CheckpointScheduler → CheckpointStorage (durable flush)
//! ```
//!
//! This crate holds the chain-agnostic parts: configuration, the checkpoint
//! store and scheduler, the publish interface, and the extracted record types.

pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod error;
pub mod publish;
pub mod retry;
pub mod scheduler;
pub mod shutdown;
pub mod types;

pub use checkpoint::{CheckpointRecord, CheckpointStorage, CheckpointStore};
pub use config::{Configuration, ListenChannel};
pub use cursor::ChannelCursor;
pub use error::{ArgError, CheckpointError, ConfigError, PublishError};
pub use publish::{HttpPublisher, LogPublisher, Publisher};
pub use scheduler::CheckpointScheduler;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use types::{BlockWrites, ChaincodeArg, ChaincodeArgs, Invocation, WriteRecord};
