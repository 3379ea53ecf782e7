//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::client::ClientConfig;
use crate::jobs::PollerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Unset means requests wait until the connection resolves
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: None,
        }
    }
}

impl ApiConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Job status polling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Interval for the multi-job upload queue
    #[serde(default = "default_upload_interval")]
    pub upload_interval_ms: u64,

    /// Interval for the single daily-sync tracker
    #[serde(default = "default_sync_interval")]
    pub sync_interval_ms: u64,

    /// Consecutive failed status checks before a job is reported as stuck
    #[serde(default = "default_stuck_after")]
    pub stuck_after: u32,
}

fn default_upload_interval() -> u64 {
    3000 // 3 seconds
}

fn default_sync_interval() -> u64 {
    1000 // 1 second
}

fn default_stuck_after() -> u32 {
    20
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            upload_interval_ms: default_upload_interval(),
            sync_interval_ms: default_sync_interval(),
            stuck_after: default_stuck_after(),
        }
    }
}

impl PollingConfig {
    /// Poller settings for the upload queue
    pub fn upload_poller(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.upload_interval_ms.max(1)),
            stuck_after: self.stuck_after,
        }
    }

    /// Poller settings for the dashboard's daily sync
    pub fn sync_poller(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.sync_interval_ms.max(1)),
            stuck_after: self.stuck_after,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("ticketpulse").join("config.toml")),
            Some(PathBuf::from("./ticketpulse.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // API overrides
        if let Ok(url) = std::env::var("TICKETPULSE_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(timeout) = std::env::var("TICKETPULSE_REQUEST_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.api.request_timeout_secs = Some(t);
            }
        }

        // Polling overrides
        if let Ok(interval) = std::env::var("TICKETPULSE_UPLOAD_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.polling.upload_interval_ms = ms;
            }
        }
        if let Ok(interval) = std::env::var("TICKETPULSE_SYNC_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.polling.sync_interval_ms = ms;
            }
        }
        if let Ok(stuck) = std::env::var("TICKETPULSE_STUCK_AFTER") {
            if let Ok(n) = stuck.parse() {
                self.polling.stuck_after = n;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("TICKETPULSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TICKETPULSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Ticketpulse Configuration
#
# Environment variables override these settings:
# - TICKETPULSE_API_URL
# - TICKETPULSE_REQUEST_TIMEOUT_SECS
# - TICKETPULSE_UPLOAD_INTERVAL_MS
# - TICKETPULSE_SYNC_INTERVAL_MS
# - TICKETPULSE_STUCK_AFTER
# - TICKETPULSE_LOG_LEVEL
# - TICKETPULSE_LOG_FORMAT

[api]
# Backend host; requests go to <base_url>/api/...
base_url = "http://localhost:3001"

# Per-request timeout in seconds (unset: wait for the connection)
# request_timeout_secs = 30

[polling]
# How often the upload queue checks job status (ms)
upload_interval_ms = 3000

# How often the daily sync tracker checks job status (ms)
sync_interval_ms = 1000

# Warn after this many consecutive failed status checks (0 disables)
stuck_after = 20

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
