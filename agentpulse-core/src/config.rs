//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agentpulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agentpulse/` (~/.config/agentpulse/)
//! - State/Logs: `$XDG_STATE_HOME/agentpulse/` (~/.local/state/agentpulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pulseboard collector configuration
    #[serde(default)]
    pub collector: CollectorConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Pulseboard collector configuration
///
/// Controls the delivery pipeline: batching, the flush cadence, the retry
/// budget, and the local queue bound.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Enable/disable Pulseboard delivery
    #[serde(default)]
    pub enabled: bool,

    /// Pulseboard server URL (e.g., `https://pulseboard.example.com`)
    pub server_url: Option<String>,

    /// API key (from registration, format: "pb_live_xxxx")
    pub api_key: Option<String>,

    /// Identity reported for this agent; generated per client when unset
    pub agent_id: Option<String>,

    /// Events per delivery batch (default 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Milliseconds between automatic flushes (default 1000)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Max retry attempts for transient failures (default 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds, doubled per attempt (default 1000)
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Ceiling for the retry delay in milliseconds (default 30000)
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Max events held locally; oldest are evicted beyond this (default 10000)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// HTTP request timeout in seconds (default 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Surface delivery failures to callers instead of only logging them
    #[serde(default)]
    pub strict: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: None,
            api_key: None,
            agent_id: None,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            queue_capacity: default_queue_capacity(),
            timeout_secs: default_timeout(),
            strict: false,
        }
    }
}

impl CollectorConfig {
    /// Check if the collector is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled && self.server_url.is_some()
    }

    /// Validate configuration, returning error message if invalid.
    ///
    /// Tunables are checked even when delivery is disabled so a broken
    /// config file fails fast rather than on first use.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "collector.batch_size must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "collector.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.batch_size > self.queue_capacity {
            return Err(Error::Config(
                "collector.batch_size cannot exceed collector.queue_capacity".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::Config(
                "collector.flush_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.initial_retry_delay_ms == 0 {
            return Err(Error::Config(
                "collector.initial_retry_delay_ms must be at least 1".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.initial_retry_delay_ms {
            return Err(Error::Config(
                "collector.max_retry_delay_ms cannot be below initial_retry_delay_ms".to_string(),
            ));
        }
        if self.enabled && self.server_url.is_none() {
            return Err(Error::Config(
                "collector.server_url is required when collector is enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retry_delay_ms() -> u64 {
    30000
}

fn default_queue_capacity() -> usize {
    10000
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.collector.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/agentpulse/config.toml` (~/.config/agentpulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("agentpulse").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/agentpulse/` (~/.local/state/agentpulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agentpulse")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/agentpulse/agentpulse.log` (~/.local/state/agentpulse/agentpulse.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("agentpulse.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
