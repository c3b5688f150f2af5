//! Persistent application configuration
//!
//! Stores the remembered input device, tracker tuning and display policy in
//! a JSON file at `<data_dir>/cyclometer/config.json`.

use cyclometer_core::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_stale_after_secs() -> u64 {
    5
}

fn default_quit_after_secs() -> u64 {
    60
}

fn default_status_interval_ms() -> u64 {
    1000
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Selected input device name (None = ask on startup)
    #[serde(default)]
    pub device: Option<String>,
    /// Detector and capture settings
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Stop showing distance once the last revolution is this old
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Exit once the last revolution is this old
    #[serde(default = "default_quit_after_secs")]
    pub quit_after_secs: u64,
    /// Status line refresh period
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: None,
            tracker: TrackerConfig::default(),
            stale_after_secs: default_stale_after_secs(),
            quit_after_secs: default_quit_after_secs(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Config file path: `<data_dir>/cyclometer/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cyclometer")
            .join("config.json")
    }

    /// Load config from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    ///
    /// A file whose tracker settings fail validation is treated like an
    /// unreadable one.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => match config.tracker.validate() {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "Loaded config from disk");
                        config
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn quit_after(&self) -> Duration {
        Duration::from_secs(self.quit_after_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}
