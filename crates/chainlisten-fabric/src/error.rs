//! Error types for block decoding, subscriptions and channel listeners.

use thiserror::Error;

use chainlisten_core::error::{CheckpointError, ConfigError};

/// A structural problem that prevents a whole block from being processed.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("block has no header")]
    MissingHeader,
}

/// Failure decoding one transaction or action. Logged and skipped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot decode {stage}: {source}")]
    Malformed {
        stage: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("missing {0}")]
    Missing(&'static str),
}

impl DecodeError {
    pub(crate) fn at(stage: &'static str) -> impl FnOnce(prost::DecodeError) -> Self {
        move |source| Self::Malformed { stage, source }
    }
}

/// Errors from a block subscription.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("subscription unavailable for channel {channel}: {reason}")]
    Unavailable { channel: String, reason: String },

    #[error("block source IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Conditions that terminate a single channel listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to register block events on {channel}: {source}")]
    Register {
        channel: String,
        #[source]
        source: SourceError,
    },

    #[error("unexpected closed block stream on {channel}")]
    StreamClosed { channel: String },

    #[error("block {block:?} on {channel}: {source}")]
    Extract {
        channel: String,
        block: Option<u64>,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("listener task for {channel} aborted: {reason}")]
    Aborted { channel: String, reason: String },
}

/// Errors that stop the supervisor before any listener starts.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("cannot load checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
