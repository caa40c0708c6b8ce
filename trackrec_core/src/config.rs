//! Configuration file support for trackrec.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/trackrec/config.toml`.

use crate::export::{ExportOptions, DEFAULT_CREATOR, DEFAULT_TRACK_NAME};
use crate::persistence::TRACK_RECORD_KEY;
use crate::slot::is_valid_key;
use crate::source::WatchOptions;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

/// Where and how the track record is stored
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_record_key")]
    pub record_key: String,

    /// Persist on a worker thread instead of inline with each sample
    #[serde(default = "default_true")]
    pub background_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            record_key: default_record_key(),
            background_writes: true,
        }
    }
}

/// GPX export settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    #[serde(default = "default_creator")]
    pub creator: String,

    #[serde(default = "default_track_name")]
    pub track_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            creator: default_creator(),
            track_name: default_track_name(),
        }
    }
}

impl ExportConfig {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            creator: self.creator.clone(),
            track_name: self.track_name.clone(),
        }
    }
}

/// Options forwarded to the location source on subscribe
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enable_high_accuracy: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub maximum_age_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: default_timeout_ms(),
            maximum_age_ms: 0,
        }
    }
}

impl SourceConfig {
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            enable_high_accuracy: self.enable_high_accuracy,
            timeout: Duration::from_millis(self.timeout_ms),
            maximum_age: Duration::from_millis(self.maximum_age_ms),
        }
    }
}

// Default value functions
fn home_dir_or_cwd() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir_or_cwd().join(".local/share"));
    base.join("trackrec")
}

fn default_export_dir() -> PathBuf {
    let base = dirs::document_dir().unwrap_or_else(|| home_dir_or_cwd().join("Documents"));
    base.join("trackrec")
}

fn default_record_key() -> String {
    TRACK_RECORD_KEY.into()
}

fn default_creator() -> String {
    DEFAULT_CREATOR.into()
}

fn default_track_name() -> String {
    DEFAULT_TRACK_NAME.into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values that would only fail later at first use
    pub fn validate(&self) -> Result<()> {
        if !is_valid_key(&self.storage.record_key) {
            return Err(Error::Config(format!(
                "storage.record_key {:?} must be non-empty and use only letters, digits, `_` or `-`",
                self.storage.record_key
            )));
        }
        if self.export.track_name.trim().is_empty() {
            return Err(Error::Config("export.track_name must not be empty".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir_or_cwd().join(".config"));
        base.join("trackrec").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
