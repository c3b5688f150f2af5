//! Tracker configuration
//!
//! Every field has a default, so a partial JSON object (or `{}`) is a valid
//! configuration.

use crate::detector::fsm::{DEFAULT_CALIBRATION_READINGS, DEFAULT_THRESHOLD_FRACTION};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Capture cadence, calibration and wheel geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Samples per processed buffer
    pub buffer_len: usize,
    /// Backlog (in samples) beyond which queued audio is discarded
    pub max_queued: usize,
    /// Sleep between polls when less than one buffer is queued
    pub poll_interval_ms: u64,
    /// Buffers averaged into the baseline stdev
    pub calibration_readings: u32,
    /// Fraction of the baseline stdev that marks a dip (entry and exit)
    pub threshold_fraction: f64,
    /// Distance travelled per revolution, in feet
    pub ft_per_rev: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            // Unstable past 30mph at 2048
            buffer_len: 1024,
            max_queued: 1024 * 10,
            poll_interval_ms: 10,
            calibration_readings: DEFAULT_CALIBRATION_READINGS,
            threshold_fraction: DEFAULT_THRESHOLD_FRACTION,
            ft_per_rev: 23.0,
        }
    }
}

impl TrackerConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be non-zero".into()));
        }
        if self.buffer_len < 2 {
            return Err(ConfigError::Invalid(format!(
                "buffer_len must be at least 2, got {}",
                self.buffer_len
            )));
        }
        if self.max_queued < self.buffer_len {
            return Err(ConfigError::Invalid(format!(
                "max_queued ({}) must be at least buffer_len ({})",
                self.max_queued, self.buffer_len
            )));
        }
        if self.calibration_readings == 0 {
            return Err(ConfigError::Invalid(
                "calibration_readings must be non-zero".into(),
            ));
        }
        if !(self.threshold_fraction > 0.0 && self.threshold_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "threshold_fraction must be in (0, 1], got {}",
                self.threshold_fraction
            )));
        }
        if !(self.ft_per_rev.is_finite() && self.ft_per_rev > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "ft_per_rev must be positive, got {}",
                self.ft_per_rev
            )));
        }
        Ok(())
    }

    /// Load and validate a JSON config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.sample_rate, 96000);
        assert_eq!(config.buffer_len, 1024);
        assert_eq!(config.max_queued, 10240);
        assert_eq!(config.calibration_readings, 250);
        assert_eq!(config.threshold_fraction, 0.75);
        assert_eq!(config.ft_per_rev, 23.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"ft_per_rev": 7.25, "calibration_readings": 100}"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ft_per_rev, 7.25);
        assert_eq!(config.calibration_readings, 100);
        assert_eq!(config.buffer_len, 1024);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            TrackerConfig {
                buffer_len: 1,
                ..Default::default()
            },
            TrackerConfig {
                max_queued: 512,
                ..Default::default()
            },
            TrackerConfig {
                calibration_readings: 0,
                ..Default::default()
            },
            TrackerConfig {
                threshold_fraction: 0.0,
                ..Default::default()
            },
            TrackerConfig {
                threshold_fraction: f64::NAN,
                ..Default::default()
            },
            TrackerConfig {
                ft_per_rev: -1.0,
                ..Default::default()
            },
            TrackerConfig {
                sample_rate: 0,
                ..Default::default()
            },
        ];

        for config in bad {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        std::fs::write(&path, r#"{"buffer_len": 2048, "max_queued": 20480}"#).unwrap();

        let config = TrackerConfig::load_from(&path).unwrap();
        assert_eq!(config.buffer_len, 2048);
        assert_eq!(config.max_queued, 20480);
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            TrackerConfig::load_from(&missing),
            Err(ConfigError::Io(_))
        ));

        let garbled = dir.path().join("garbled.json");
        std::fs::write(&garbled, "{ not json").unwrap();
        assert!(matches!(
            TrackerConfig::load_from(&garbled),
            Err(ConfigError::Parse(_))
        ));

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, r#"{"buffer_len": 0}"#).unwrap();
        assert!(matches!(
            TrackerConfig::load_from(&invalid),
            Err(ConfigError::Invalid(_))
        ));
    }
}
