//! Engine configuration, loadable from an optional TOML file.
//!
//! A missing file yields `Config::default()`. Unknown keys are silently
//! ignored by serde so older configs keep working as fields are added.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

/// Engine configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the platform's feed API.
    pub api_base_url: String,

    /// Per-request timeout in seconds for page and status fetches.
    pub request_timeout_secs: u64,

    /// Interval between background unread polls, in seconds.
    pub poll_interval_secs: u64,

    /// Path of the SQLite file backing cursor persistence.
    /// `":memory:"` keeps state for the session only.
    pub persistence_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.ripple.example/v1/".to_string(),
            request_timeout_secs: 30,
            poll_interval_secs: 30,
            persistence_path: ":memory:".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB); a larger file is corrupt or hostile.
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line info
    /// - Unknown keys → silently accepted
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(&contents)?)
    }
}
