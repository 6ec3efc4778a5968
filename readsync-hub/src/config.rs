//! Hub configuration
//!
//! Bootstrap settings come from an optional TOML file; command-line flags
//! override file values. Everything has a built-in default so the hub starts
//! with no configuration at all.

use readsync_common::config::{Thresholds, DEFAULT_FEED_CAPACITY};
use readsync_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default hub port
pub const DEFAULT_PORT: u16 = 5727;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-subscriber feed buffer capacity
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,

    /// Idle/stuck inference thresholds
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Ended-session retention
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Retention of ended-session tombstones
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Seconds between sweeper passes
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds an ended session stays readable before pruning
    #[serde(default = "default_ended_ttl_secs")]
    pub ended_ttl_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_feed_capacity() -> usize {
    DEFAULT_FEED_CAPACITY
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_ended_ttl_secs() -> u64 {
    300
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            feed_capacity: default_feed_capacity(),
            thresholds: Thresholds::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            ended_ttl_secs: default_ended_ttl_secs(),
        }
    }
}

impl HubConfig {
    /// Load from a TOML file; missing keys fall back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
