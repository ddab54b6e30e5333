//! Configuration management for tributary.
//!
//! Configuration is read from `~/.config/tributary/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::api::{HttpSettings, BATCH_SIZE};
use crate::domain::Feed;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub daemon: DaemonSection,
}

/// Limits of a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Items per page on first sync and when loading more.
    pub batch_size: i64,
    /// Retention cap for the item table.
    pub max_items: i64,
    pub failed_feed_threshold: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            max_items: 10_000,
            failed_feed_threshold: Feed::DEFAULT_FAILED_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let settings = HttpSettings::default();
        Self {
            connect_timeout_secs: settings.connect_timeout.as_secs(),
            read_timeout_secs: settings.read_timeout.as_secs(),
            user_agent: None,
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        let defaults = HttpSettings::default();
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

/// Intervals of the background daemon, written like "1h" or "30m".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub interval: String,
    /// How often pending local changes are pushed between full syncs.
    pub changes_interval: String,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            interval: "1h".into(),
            changes_interval: "5m".into(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file use default values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/tributary/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tributary").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> &'static str {
        r##"# tributary configuration
#
# Account credentials are not stored here. Use `tributary login` instead;
# they are kept in credentials.toml next to this file.

[sync]
# Items requested per page on the first sync and when loading older items
batch_size = 100

# Maximum number of items kept locally. Read, unstarred items are purged
# oldest first once this is exceeded.
max_items = 10000

# Feeds with at least this many consecutive update errors are reported as failed
failed_feed_threshold = 50

[http]
connect_timeout_secs = 20

# Long enough for the complete item list of a first sync
read_timeout_secs = 3600

# user_agent = "tributary"

[daemon]
# Full sync interval ("30m", "1h", "1d")
interval = "1h"

# How often locally changed items are uploaded between full syncs
changes_interval = "5m"
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
