//! chainlisten-fabric — Hyperledger Fabric side of the ChainListen block listener.
//!
//! # Pipeline
//!
//! ```text
//! Supervisor
//!   ├── ChannelListener × N
//!   │      BlockSource ─► BlockExtractor ─► Publisher
//!   │                                   └─► CheckpointStore::update
//!   └── CheckpointScheduler (chainlisten-core)
//! ```
//!
//! Block decoding uses hand-declared `prost` messages in [`proto`]; only the
//! fields on the path from a block to its key-value writes are modelled.

pub mod error;
pub mod extractor;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
pub mod listener;
pub mod proto;
pub mod source;
pub mod supervisor;

pub use error::{ExtractError, ListenerError, SourceError, SupervisorError};
pub use extractor::{BlockExtractor, ExtractStats};
pub use listener::{ChannelListener, ListenerState};
pub use proto::Block;
pub use source::{BlockEvent, BlockEventStream, BlockSource, ChannelBlockSource, DirectoryBlockSource, Registration};
pub use supervisor::{ChannelExit, Supervisor, SupervisorHandle};
