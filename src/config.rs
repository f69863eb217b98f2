//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::Framing;
use crate::telemetry::{ThresholdBand, DEFAULT_DISPLAY_BAND, DEFAULT_WARNING_BAND};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SPYDER_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Producer-facing TCP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_ingest_port")]
    pub port: u16,

    #[serde(default)]
    pub framing: Framing,

    /// Read buffer size in read-event mode, maximum line length in lines mode
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ingest_port() -> u16 {
    12000
}

fn default_max_frame_bytes() -> usize {
    64 * 1024 // 64 KB
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_ingest_port(),
            framing: Framing::default(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl IngestConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Consumer-facing WebSocket/HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_broadcast_port")]
    pub port: u16,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_session_queue_capacity")]
    pub session_queue_capacity: usize,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// How long shutdown waits for session writers to drain
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_broadcast_port() -> u16 {
    8080
}

fn default_max_sessions() -> usize {
    1000
}

fn default_session_queue_capacity() -> usize {
    64
}

fn default_send_timeout() -> u64 {
    2000 // 2 seconds
}

fn default_shutdown_grace() -> u64 {
    5000 // 5 seconds
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_broadcast_port(),
            max_sessions: default_max_sessions(),
            session_queue_capacity: default_session_queue_capacity(),
            send_timeout_ms: default_send_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl BroadcastConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Relay behaviour
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Push warning events to consumers in addition to logging them
    #[serde(default)]
    pub broadcast_warnings: bool,
}

/// Temperature bands. The two are independent on purpose.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdsConfig {
    /// Band driving the ingest-side warning detector
    #[serde(default = "default_warning_band")]
    pub warning: ThresholdBand,

    /// Band the presentation layer colours values by
    #[serde(default = "default_display_band")]
    pub display: ThresholdBand,
}

fn default_warning_band() -> ThresholdBand {
    DEFAULT_WARNING_BAND
}

fn default_display_band() -> ThresholdBand {
    DEFAULT_DISPLAY_BAND
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            warning: default_warning_band(),
            display: default_display_band(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
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

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config = Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the listeners cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.max_frame_bytes == 0 {
            return Err(ConfigError::invalid("ingest.max_frame_bytes", "must be at least 1"));
        }
        if self.broadcast.max_sessions == 0 {
            return Err(ConfigError::invalid("broadcast.max_sessions", "must be at least 1"));
        }
        if self.broadcast.session_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "broadcast.session_queue_capacity",
                "must be at least 1",
            ));
        }
        for (field, band) in [
            ("thresholds.warning", &self.thresholds.warning),
            ("thresholds.display", &self.thresholds.display),
        ] {
            if band.lower.is_nan() || band.upper.is_nan() || band.lower > band.upper {
                return Err(ConfigError::invalid(field, "lower must not exceed upper"));
            }
        }
        Ok(())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
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

    /// Find the config file to use, if any
    ///
    /// `SPYDER_CONFIG` wins; otherwise the first existing default location.
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }

        let config_paths = [
            dirs::config_dir().map(|p| p.join("spyder").join("config.toml")),
            Some(PathBuf::from("/etc/spyder/config.toml")),
            Some(PathBuf::from("./spyder.toml")),
        ];

        config_paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Ingest overrides
        if let Some(host) = lookup("SPYDER_INGEST_HOST") {
            self.ingest.host = host;
        }
        if let Some(port) = lookup("INGEST_PORT") {
            match port.parse() {
                Ok(p) => self.ingest.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid INGEST_PORT"),
            }
        }

        // Broadcast overrides
        if let Some(host) = lookup("SPYDER_BROADCAST_HOST") {
            self.broadcast.host = host;
        }
        if let Some(port) = lookup("BROADCAST_PORT") {
            match port.parse() {
                Ok(p) => self.broadcast.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid BROADCAST_PORT"),
            }
        }

        // Logging overrides
        if let Some(level) = lookup("SPYDER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SPYDER_LOG_FORMAT") {
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

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        ConfigError::Invalid { field, reason }
    }
}
