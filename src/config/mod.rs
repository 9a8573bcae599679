//! Configuration management for chatpin.
//!
//! Handles persistence and loading of timing knobs and the debug flag.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Verbose logging of every pass, pin and navigation attempt
    #[serde(default)]
    pub debug: bool,

    /// Timer and timeout configuration
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    /// Load configuration from disk, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or return default if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.timing.validate();

        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;

        Ok(config_dir.join("chatpin").join("config.json"))
    }
}

/// Timer and timeout configuration, all in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Mutation batches arriving this soon after a pass are dropped
    #[serde(default = "default_quiet_period")]
    pub quiet_period_ms: u64,

    /// Delay between the last relevant batch and the pass it triggers
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Interval between checks for the sidebar at startup
    #[serde(default = "default_sidebar_poll")]
    pub sidebar_poll_ms: u64,

    /// Location polling interval when the host offers no navigation hook
    #[serde(default = "default_location_poll")]
    pub location_poll_ms: u64,

    /// Bounded wait for cross-context requests (3000-5000)
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_ms: u64,

    /// How long a manual navigation may take before a full page load
    #[serde(default = "default_spa_fallback")]
    pub spa_fallback_ms: u64,

    /// Consecutive deletion checks an id must be missing before eviction (1-10)
    #[serde(default = "default_deletion_grace")]
    pub deletion_grace_passes: u32,
}

fn default_quiet_period() -> u64 {
    500
}

fn default_settle_delay() -> u64 {
    200
}

fn default_sidebar_poll() -> u64 {
    500
}

fn default_location_poll() -> u64 {
    500
}

fn default_relay_timeout() -> u64 {
    3000
}

fn default_spa_fallback() -> u64 {
    100
}

fn default_deletion_grace() -> u32 {
    1
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period(),
            settle_delay_ms: default_settle_delay(),
            sidebar_poll_ms: default_sidebar_poll(),
            location_poll_ms: default_location_poll(),
            relay_timeout_ms: default_relay_timeout(),
            spa_fallback_ms: default_spa_fallback(),
            deletion_grace_passes: default_deletion_grace(),
        }
    }
}

impl TimingConfig {
    /// Clamp values to their valid ranges
    pub fn validate(&mut self) {
        self.relay_timeout_ms = self.relay_timeout_ms.clamp(3000, 5000);
        self.deletion_grace_passes = self.deletion_grace_passes.clamp(1, 10);
        self.sidebar_poll_ms = self.sidebar_poll_ms.max(1);
        self.location_poll_ms = self.location_poll_ms.max(1);
    }
}
