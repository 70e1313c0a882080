use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_NAME: &str = "appinfo.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(std::io::Error),
    #[error("failed to write config file: {0}")]
    Write(std::io::Error),
    #[error("failed to parse toml: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize toml: {0}")]
    Serialize(toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub appinfo: AppInfoSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub backend: BackendSection,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        let config = toml::from_str(&content).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        if path.exists() {
            Config::load_from_path(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(ConfigError::Write)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInfoSection {
    pub version: String,
}

impl Default for AppInfoSection {
    fn default() -> Self {
        AppInfoSection {
            version: "0.1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSection {
    pub path: PathBuf,
    #[serde(default)]
    pub checksum_after_commit: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        StoreSection {
            path: PathBuf::from(DEFAULT_DB_NAME),
            checksum_after_commit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendSection {
    pub default: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_file: Option<PathBuf>,
}

impl Default for BackendSection {
    fn default() -> Self {
        BackendSection {
            default: "dpkg".to_string(),
            list_file: None,
        }
    }
}
