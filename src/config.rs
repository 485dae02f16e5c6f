//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Pre-shared key sent as `X-API-KEY`; empty disables the header
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Durable queue configuration
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_dir")]
    pub dir: String,
}

/// Device pseudonym configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "default_salt")]
    pub salt: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stderr only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_base_url() -> String { "http://localhost:5000".to_string() }
fn default_timeout_ms() -> u64 { 5000 }

fn default_queue_dir() -> String { "./queue".to_string() }

fn default_salt() -> String { crate::identity::DEFAULT_SALT.to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { dir: default_queue_dir() }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { salt: default_salt() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            queue: QueueConfig::default(),
            identity: IdentityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EndpointConfig {
    /// Per-send upper bound
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// API key, if one is configured
    pub fn api_key(&self) -> Option<String> {
        Some(self.api_key.clone()).filter(|k| !k.is_empty())
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cellprobe::config::Config;
    ///
    /// let config = Config::load("config/cellprobe.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate endpoint
        let url = self.endpoint.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(crate::error::RelayError::Config(
                toml::de::Error::custom("base_url must start with http:// or https://")
            ));
        }

        if self.endpoint.timeout_ms == 0 || self.endpoint.timeout_ms > 60000 {
            return Err(crate::error::RelayError::Config(
                toml::de::Error::custom("timeout_ms must be between 1 and 60000")
            ));
        }

        // Validate queue
        if self.queue.dir.trim().is_empty() {
            return Err(crate::error::RelayError::Config(
                toml::de::Error::custom("queue dir cannot be empty")
            ));
        }

        // Validate identity
        if self.identity.salt.is_empty() {
            return Err(crate::error::RelayError::Config(
                toml::de::Error::custom("identity salt cannot be empty")
            ));
        }

        // Validate log level
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(crate::error::RelayError::Config(
                toml::de::Error::custom("log level must be one of: trace, debug, info, warn, error")
            ));
        }

        Ok(())
    }
}
