//! User settings and preferences
//!
//! Manages application settings stored in ~/.pgfunc/config.toml

use crate::config::ConnectionConfig;
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which persistence adapter holds connection profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// A JSON array of profiles
    #[default]
    Json,
    /// The hierarchical `PostgreSQL/connections/<name>` settings layout
    Settings,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageKind,

    /// Overrides ~/.pgfunc/connections.json
    #[serde(default)]
    pub profiles_file: Option<PathBuf>,

    /// Overrides ~/.pgfunc/settings.toml
    #[serde(default)]
    pub settings_file: Option<PathBuf>,

    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    #[serde(default = "default_execute_timeout")]
    pub execute_timeout_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_schema")]
    pub default_schema: String,

    #[serde(default = "default_max_cell_width")]
    pub max_cell_width: usize,
}

fn default_test_timeout() -> u64 {
    5
}

fn default_execute_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_schema() -> String {
    "muvd".to_string()
}

fn default_max_cell_width() -> usize {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            profiles_file: None,
            settings_file: None,
            test_timeout_secs: default_test_timeout(),
            execute_timeout_secs: default_execute_timeout(),
            log_level: default_log_level(),
            default_schema: default_schema(),
            max_cell_width: default_max_cell_width(),
        }
    }
}

impl Settings {
    /// Connect timeout used when testing a profile
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Connect timeout used for metadata queries and function execution
    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.execute_timeout_secs)
    }

    /// Resolved path of the JSON profiles file
    pub fn profiles_path(&self) -> ConfigResult<PathBuf> {
        match &self.profiles_file {
            Some(path) => Ok(path.clone()),
            None => ConnectionConfig::connections_file(),
        }
    }

    /// Resolved path of the settings-layout file
    pub fn settings_path(&self) -> ConfigResult<PathBuf> {
        match &self.settings_file {
            Some(path) => Ok(path.clone()),
            None => Ok(ConnectionConfig::config_dir()?.join("settings.toml")),
        }
    }
}

/// Load settings from ~/.pgfunc/config.toml
pub fn load_settings() -> ConfigResult<Settings> {
    let path = ConnectionConfig::config_dir()?.join("config.toml");
    load_settings_from(&path)
}

/// Load settings from an explicit path; a missing file yields defaults
pub fn load_settings_from(path: &Path) -> ConfigResult<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings = toml::from_str(&content)?;
    if settings.test_timeout_secs == 0 || settings.execute_timeout_secs == 0 {
        return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
    }
    Ok(settings)
}
