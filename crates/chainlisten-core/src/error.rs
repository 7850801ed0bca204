//! Error types for the chainlisten pipeline.

use thiserror::Error;

/// Errors raised while loading or validating the listener configuration.
///
/// All of these are startup-fatal: the process exits before any listener runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("record interval must be at least {min}s, got {got}s")]
    RecordIntervalTooSmall { min: u64, got: u64 },

    #[error("stall-timeout must be at least 1s")]
    ZeroStallTimeout,

    #[error("invalid log level {level:?} for {component}")]
    InvalidLogLevel { component: String, level: String },

    #[error("duplicate channel id in listen-channels: {0}")]
    DuplicateChannel(String),

    #[error("no channels configured")]
    NoChannels,

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid third-service url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot read network profile {path}: {source}")]
    NetworkProfile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the checkpoint store and its durable storage.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("channel not registered in checkpoint store: {0}")]
    UnknownChannel(String),

    #[error("checkpoint IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint serialization error: {0}")]
    Serde(#[from] serde_yaml::Error),

    #[error("checkpoint storage error: {0}")]
    Storage(String),
}

impl CheckpointError {
    /// Returns `true` if the error is a contract violation by the caller
    /// rather than a storage failure.
    pub fn is_unknown_channel(&self) -> bool {
        matches!(self, Self::UnknownChannel(_))
    }
}

/// Errors from the downstream publish interface.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish target not configured")]
    NotConfigured,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },
}

impl PublishError {
    /// Returns `true` if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Errors from building chaincode argument lists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("unsupported chaincode arg kind at position {index}: {kind}")]
    UnsupportedKind { index: usize, kind: String },

    #[error("byte value out of range at position {index}")]
    ByteOutOfRange { index: usize },
}
