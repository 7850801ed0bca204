//! Listener configuration (`listen-cfg.yaml`).
//!
//! The configuration is loaded once at startup, validated, and then passed by
//! reference into the supervisor. Nothing in the pipeline reads global state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryConfig;

/// Default location of the configuration document.
pub const DEFAULT_CONFIG_PATH: &str = "./config/listen-cfg.yaml";

/// Smallest accepted checkpoint flush interval, in seconds.
pub const MIN_RECORD_SECONDS: u64 = 3;

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    /// Network profile and crypto material locations.
    #[serde(rename = "crypto")]
    pub network: NetworkConfig,
    /// Checkpoint persistence target and interval.
    pub record: RecordConfig,
    /// Downstream service receiving extracted writes.
    #[serde(default)]
    pub third_service: Option<ThirdService>,
    /// Channels to listen to.
    pub listen_channels: Vec<ListenChannel>,
    /// Seconds without a block event before a channel is reported stalled.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout: u64,
    /// Re-registration policy after an unexpected stream closure.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Block file source settings.
    #[serde(default)]
    pub source: SourceConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_stall_timeout() -> u64 { 300 }

/// Locations of the network connection profile and crypto material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    #[serde(default)]
    pub crypto_config_path: PathBuf,
    pub network_yaml_path: PathBuf,
}

/// Checkpoint persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RecordConfig {
    /// Flush interval in seconds (minimum [`MIN_RECORD_SECONDS`]).
    pub seconds: u64,
    /// Path of the persisted checkpoint document.
    pub data_path: PathBuf,
}

/// One channel to listen to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenChannel {
    pub id: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub user: String,
    /// Last block height considered processed; listening starts right after it.
    #[serde(rename = "from", default)]
    pub from_block: u64,
}

impl ListenChannel {
    pub fn new(id: impl Into<String>, from_block: u64) -> Self {
        Self {
            id: id.into(),
            org: String::new(),
            user: String::new(),
            from_block,
        }
    }
}

/// The downstream service that receives extracted writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdService {
    /// Base address, e.g. `http://127.0.0.1:8080/api`.
    pub url: String,
    /// Version segment inserted between base and method path.
    #[serde(default)]
    pub version: String,
    /// method name → path
    #[serde(default)]
    pub methods: HashMap<String, String>,
}

impl ThirdService {
    /// Resolve a method name to `base/version/mappedPath`.
    pub fn method_url(&self, method: &str) -> Result<url::Url, ConfigError> {
        let mapped = self
            .methods
            .get(method)
            .ok_or_else(|| ConfigError::UnknownMethod(method.to_string()))?;

        let mut url = url::Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        let segments: Vec<&str> = [url.path(), self.version.as_str(), mapped.as_str()]
            .iter()
            .flat_map(|part| part.split('/'))
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let path = format!("/{}", segments.join("/"));
        url.set_path(&path);
        Ok(url)
    }
}

/// Re-registration policy for closed block streams.
///
/// `max-retries: 0` keeps a closed stream fatal for its channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconnectConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 { 1_000 }
fn default_max_backoff_ms() -> u64 { 30_000 }

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
            jitter_fraction: 0.0,
        }
    }
}

/// Settings for the directory-backed block source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Directory holding `<channel>_<number>.block` files.
    #[serde(default)]
    pub blocks_dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 { 1_000 }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            blocks_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Log output settings.
///
/// `level` applies to the chainlisten crates; `dependencies` to every other
/// target. `components` overrides one crate, keyed either by its short name
/// (`core`, `fabric`, `storage`, `cli`) or by a full tracing target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_dependencies_level")]
    pub dependencies: String,
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    /// One JSON object per event instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

/// Short component names and the tracing target of the crate they select.
pub const LOG_COMPONENTS: &[(&str, &str)] = &[
    ("core", "chainlisten_core"),
    ("fabric", "chainlisten_fabric"),
    ("storage", "chainlisten_storage"),
    ("cli", "chainlisten"),
];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

fn default_level() -> String {
    "info".to_string()
}

fn default_dependencies_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dependencies: default_dependencies_level(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives in `RUST_LOG` syntax, global level first.
    pub fn directives(&self) -> Vec<String> {
        let mut targets: BTreeMap<String, &str> = LOG_COMPONENTS
            .iter()
            .map(|(_, target)| (target.to_string(), self.level.as_str()))
            .collect();
        for (component, level) in &self.components {
            targets.insert(component_target(component), level.as_str());
        }

        let mut out = vec![self.dependencies.clone()];
        out.extend(targets.into_iter().map(|(target, level)| format!("{target}={level}")));
        out
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_level("level", &self.level)?;
        check_level("dependencies", &self.dependencies)?;
        for (component, level) in &self.components {
            check_level(component, level)?;
        }
        Ok(())
    }
}

fn component_target(component: &str) -> String {
    LOG_COMPONENTS
        .iter()
        .find(|(short, _)| *short == component)
        .map(|(_, target)| target.to_string())
        .unwrap_or_else(|| component.replace('-', "_"))
}

fn check_level(component: &str, level: &str) -> Result<(), ConfigError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidLogLevel {
            component: component.to_string(),
            level: level.to_string(),
        })
    }
}

impl Configuration {
    /// Read, parse and validate the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&data)
    }

    /// Parse and validate a configuration document.
    pub fn from_yaml_str(data: &str) -> Result<Self, ConfigError> {
        let cfg: Configuration = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.record.seconds < MIN_RECORD_SECONDS {
            return Err(ConfigError::RecordIntervalTooSmall {
                min: MIN_RECORD_SECONDS,
                got: self.record.seconds,
            });
        }
        if self.stall_timeout == 0 {
            return Err(ConfigError::ZeroStallTimeout);
        }
        if self.listen_channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        let mut seen = HashSet::new();
        for channel in &self.listen_channels {
            if !seen.insert(channel.id.as_str()) {
                return Err(ConfigError::DuplicateChannel(channel.id.clone()));
            }
        }
        self.log.validate()
    }

    /// Fails if the network connection profile cannot be read.
    pub fn verify_network_profile(&self) -> Result<(), ConfigError> {
        let path = &self.network.network_yaml_path;
        std::fs::read(path)
            .map(|_| ())
            .map_err(|source| ConfigError::NetworkProfile {
                path: path.display().to_string(),
                source,
            })
    }

    pub fn record_interval(&self) -> Duration {
        Duration::from_secs(self.record.seconds)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout)
    }
}
