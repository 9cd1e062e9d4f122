//! Configuration management for Photodiary.
//!
//! Configuration is stored as TOML in a platform-appropriate location. Every
//! section is optional; missing keys take their defaults.

use crate::error::{DiaryError, Result};
use crate::index::DEFAULT_PARALLEL_THRESHOLD;
use crate::notify::DEFAULT_CHANNEL_CAPACITY;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_NAME: &str = "photodiary";
const CONFIG_FILE: &str = "photodiary.toml";

/// Main configuration structure.
///
/// ## Example Configuration File (photodiary.toml)
///
/// ```toml
/// [general]
/// data_dir = "/home/me/diary"
/// log_level = "debug"
///
/// [storage]
/// compress = true
/// recreate_on_mismatch = false
///
/// [query]
/// page_size = 20
///
/// [notify]
/// channel_capacity = 64
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
    pub notify: NotifyConfig,
}

/// General configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Store location (None = platform data directory)
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// Entry store options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Compress the store body with LZ4
    pub compress: bool,

    /// Move an unreadable store aside and start empty instead of failing
    pub recreate_on_mismatch: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            compress: true,
            recreate_on_mismatch: true,
        }
    }
}

/// Query and index options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Entries per page when listing
    pub page_size: usize,

    /// Entry count above which index builds run in parallel
    pub parallel_threshold: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            page_size: 50,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

/// Change notification options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Undelivered events each channel subscriber may queue
    pub channel_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| DiaryError::ConfigError {
            reason: format!("Failed to parse {}: {}", path.display(), e),
        })
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| DiaryError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME).ok_or_else(|| DiaryError::ConfigError {
            reason: "Could not determine home directory".to_string(),
        })
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join(CONFIG_FILE))
    }

    /// Get the store directory (from config or default).
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.general.data_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.storage.compress);
        assert!(config.storage.recreate_on_mismatch);
        assert_eq!(config.query.page_size, 50);
        assert_eq!(config.query.parallel_threshold, 10_000);
        assert_eq!(config.notify.channel_capacity, 256);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("test.toml");

        let mut config = Config::default();
        config.general.data_dir = Some(temp_dir.path().join("data"));
        config.query.page_size = 10;
        config.storage.compress = false;

        config.save_to(&config_path).unwrap();
        let loaded = Config::load_from(&config_path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.data_dir().unwrap(), temp_dir.path().join("data"));
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "[query]\npage_size = 5\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.query.page_size, 5);
        assert_eq!(config.query.parallel_threshold, 10_000);
        assert!(config.storage.compress);
    }

    #[test]
    fn test_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        fs::write(&config_path, "[query\npage_size = ").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(matches!(err, DiaryError::ConfigError { .. }));
    }
}
