//! Discovery tunables and their persistent storage
//!
//! Tunables are stored as TOML under a `[config]` table:
//!
//! ```toml
//! [config]
//! emitFrequency = 5
//! maxLinkAge = 30
//! pipelineValidationFrequency = 60
//! portRediscoveryFrequency = 60
//! linkPruneFrequency = 2
//! ```
//!
//! Missing keys fall back to their defaults. A store that cannot be read or
//! parsed yields the full default set via [`load_or_default`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Tunables for the discovery controller, all in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Probe emission period
    #[serde(default = "default_emit_frequency")]
    pub emit_frequency: i64,
    /// Links not refreshed within this age are pruned
    #[serde(default = "default_max_link_age")]
    pub max_link_age: i64,
    /// Pipeline capability re-validation period
    #[serde(default = "default_pipeline_validation_frequency")]
    pub pipeline_validation_frequency: i64,
    /// Full port re-enumeration period
    #[serde(default = "default_port_rediscovery_frequency")]
    pub port_rediscovery_frequency: i64,
    /// Stale link and host pruning period
    #[serde(default = "default_link_prune_frequency")]
    pub link_prune_frequency: i64,
}

fn default_emit_frequency() -> i64 {
    5
}

fn default_max_link_age() -> i64 {
    30
}

fn default_pipeline_validation_frequency() -> i64 {
    60
}

fn default_port_rediscovery_frequency() -> i64 {
    60
}

fn default_link_prune_frequency() -> i64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            emit_frequency: default_emit_frequency(),
            max_link_age: default_max_link_age(),
            pipeline_validation_frequency: default_pipeline_validation_frequency(),
            port_rediscovery_frequency: default_port_rediscovery_frequency(),
            link_prune_frequency: default_link_prune_frequency(),
        }
    }
}

impl Config {
    /// Tree/file keys of the five tunables, in declaration order
    pub const KEYS: [&'static str; 5] = [
        "emitFrequency",
        "maxLinkAge",
        "pipelineValidationFrequency",
        "portRediscoveryFrequency",
        "linkPruneFrequency",
    ];

    /// Get a tunable by its tree/file key
    pub fn get(&self, key: &str) -> Option<i64> {
        match key {
            "emitFrequency" => Some(self.emit_frequency),
            "maxLinkAge" => Some(self.max_link_age),
            "pipelineValidationFrequency" => Some(self.pipeline_validation_frequency),
            "portRediscoveryFrequency" => Some(self.port_rediscovery_frequency),
            "linkPruneFrequency" => Some(self.link_prune_frequency),
            _ => None,
        }
    }

    /// Set a tunable by its tree/file key; returns false for unknown keys
    pub fn set(&mut self, key: &str, value: i64) -> bool {
        let slot = match key {
            "emitFrequency" => &mut self.emit_frequency,
            "maxLinkAge" => &mut self.max_link_age,
            "pipelineValidationFrequency" => &mut self.pipeline_validation_frequency,
            "portRediscoveryFrequency" => &mut self.port_rediscovery_frequency,
            "linkPruneFrequency" => &mut self.link_prune_frequency,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Key/value pairs of all tunables
    pub fn entries(&self) -> Vec<(&'static str, i64)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|v| (*key, v)))
            .collect()
    }

    /// Copy with every non-positive tunable replaced by its default
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut config = *self;
        for key in Self::KEYS {
            if config.get(key).unwrap_or(0) <= 0 {
                config.set(key, defaults.get(key).unwrap_or(1));
            }
        }
        config
    }

    pub fn emit_period(&self) -> Duration {
        seconds(self.emit_frequency)
    }

    pub fn link_max_age(&self) -> Duration {
        seconds(self.max_link_age)
    }

    pub fn pipeline_validation_period(&self) -> Duration {
        seconds(self.pipeline_validation_frequency)
    }

    pub fn port_rediscovery_period(&self) -> Duration {
        seconds(self.port_rediscovery_frequency)
    }

    pub fn prune_period(&self) -> Duration {
        seconds(self.link_prune_frequency)
    }
}

/// Timers cannot run with a zero period, so clamp to at least one second
fn seconds(value: i64) -> Duration {
    Duration::from_secs(u64::try_from(value).unwrap_or(0).max(1))
}

/// On-disk layout: tunables live under a `config` table
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: Config,
}

/// Backing storage for the tunables
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config, ConfigError>;
    fn save(&self, config: &Config) -> Result<(), ConfigError>;
}

/// TOML file storage
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Config, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::NotFound(self.path.clone()));
        }
        let content = std::fs::read_to_string(&self.path)?;
        let file: ConfigFile = toml::from_str(&content)?;
        debug!(path = %self.path.display(), "Loaded tunables");
        Ok(file.config)
    }

    fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&ConfigFile { config: *config })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "Saved tunables");
        Ok(())
    }
}

/// In-memory storage, starts empty
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Option<Config>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Mutex::new(Some(config)),
        }
    }

    /// Last saved config, if any
    pub fn saved(&self) -> Option<Config> {
        *self.config.lock()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config
            .lock()
            .ok_or_else(|| ConfigError::NotFound(PathBuf::from("<memory>")))
    }

    fn save(&self, config: &Config) -> Result<(), ConfigError> {
        *self.config.lock() = Some(*config);
        Ok(())
    }
}

/// Load tunables, falling back to defaults on any error
pub fn load_or_default(store: &dyn ConfigStore) -> Config {
    match store.load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Unable to load config; using defaults");
            Config::default()
        }
    }
}
