//! Tunable policy constants for a network.
//!
//! None of these are bit-exact contracts; they trade responsiveness against
//! per-tick cost. Configs load from TOML, and from RON or JSON with the
//! `config-formats` feature.

use crate::fixed::{Ticks, Units};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from building or loading a [`NetworkConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NonPositive { field: &'static str },

    #[error("{field} ({value}) must not exceed {limit_name} ({limit})")]
    OutOfOrder {
        field: &'static str,
        value: u64,
        limit_name: &'static str,
        limit: u64,
    },

    #[error("unsupported config format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    #[cfg(feature = "config-formats")]
    Ron,
    #[cfg(feature = "config-formats")]
    Json,
}

/// Detect the format of a config file from its extension.
pub fn detect_format(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Ok(Format::Toml),
        #[cfg(feature = "config-formats")]
        Some("ron") => Ok(Format::Ron),
        #[cfg(feature = "config-formats")]
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Ticks between scheduled full rescans; also how long a cache entry is
    /// trusted.
    pub scan_interval: Ticks,
    /// Maximum units a node pushes per tick.
    pub transfer_rate: Units,
    /// How far below the top effective priority a less loaded target may be
    /// and still be preferred.
    pub balance_tolerance: i64,
    /// Ticks without transfer after which an empty node is idle.
    pub idle_window: Ticks,
    /// Ticks a face counts as transferring after its last push.
    pub active_window: Ticks,
    /// Cadence of passive cache cleanup and stats trimming.
    pub passive_cleanup_interval: Ticks,
    /// Cadence of deep maintenance (forced rescan, failure reporting).
    pub deep_maintenance_interval: Ticks,
    /// Age beyond which stats history is trimmed.
    pub stats_retention: Ticks,
    /// Transfer records kept per node.
    pub stats_history_len: usize,
    /// Consecutive stuck ticks before a node reports persistent output failure.
    pub output_failure_threshold: u32,
    /// Events kept before the oldest are dropped.
    pub event_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            scan_interval: 20,
            transfer_rate: 1000,
            balance_tolerance: 5,
            idle_window: 40,
            active_window: 10,
            passive_cleanup_interval: 200,
            deep_maintenance_interval: 1200,
            stats_retention: 600,
            stats_history_len: 16,
            output_failure_threshold: 100,
            event_capacity: 1024,
        }
    }
}

impl NetworkConfig {
    /// Check that cadences are positive and nested.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 5] = [
            ("scan_interval", self.scan_interval),
            ("idle_window", self.idle_window),
            ("active_window", self.active_window),
            ("passive_cleanup_interval", self.passive_cleanup_interval),
            ("deep_maintenance_interval", self.deep_maintenance_interval),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::NonPositive { field });
            }
        }
        if self.transfer_rate <= 0 {
            return Err(ConfigError::NonPositive { field: "transfer_rate" });
        }
        if self.passive_cleanup_interval > self.deep_maintenance_interval {
            return Err(ConfigError::OutOfOrder {
                field: "passive_cleanup_interval",
                value: self.passive_cleanup_interval,
                limit_name: "deep_maintenance_interval",
                limit: self.deep_maintenance_interval,
            });
        }
        Ok(())
    }

    /// Parse and validate a config in the given format.
    pub fn from_str_with(content: &str, format: Format) -> Result<Self, ConfigError> {
        let config: NetworkConfig = match format {
            Format::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?,
            #[cfg(feature = "config-formats")]
            Format::Ron => ron::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?,
            #[cfg(feature = "config-formats")]
            Format::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML config.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::from_str_with(content, Format::Toml)
    }

    /// Load a config file, picking the format from its extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::from_str_with(&content, format)
    }
}
