//! Configuration file parsing
//!
//! Parses the TOML configuration file for the upload server. Every key has
//! a default, so an empty file is a valid configuration.

use crate::multipart::ExtractLimits;
use crate::vault::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Smallest scan window accepted from configuration
const MIN_CHUNK_SIZE: usize = 64;

/// Upper bound on retention, keeps deadline arithmetic far from overflow
const MAX_RETENTION_DAYS: u64 = 36_500;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Upload handling
    #[serde(default)]
    pub upload: UploadConfig,

    /// Storage directory and retention
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,

    /// Path uploads are POSTed to
    pub upload_path: String,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Serve stored files under /files/
    pub serve_files: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:80".to_string(),
            upload_path: "/upload/".to_string(),
            log_level: "info".to_string(),
            serve_files: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address {:?}: {}", self.bind, e)))
    }

    /// Parse log level string
    pub fn log_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" | "warning" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => {
                eprintln!("Unknown log level '{}', defaulting to 'info'", self.log_level);
                log::LevelFilter::Info
            }
        }
    }
}

/// Upload handling settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Shared secret expected in the `key` header
    pub secret: String,

    /// Base URL prefixed to stored file names in responses
    pub address: String,

    /// Response body for every failed upload
    pub fail_address: String,

    /// Accept only image/png and image/jpeg
    pub only_images: bool,

    /// Scan window size in bytes
    pub chunk_size: usize,

    /// Largest accepted payload in bytes
    pub max_payload_bytes: usize,

    /// Compare bytes with the stored file on a dedup hit
    pub verify_existing: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let limits = ExtractLimits::default();
        Self {
            secret: String::new(),
            address: "http://localhost/".to_string(),
            fail_address: "http://localhost/failed.jpg".to_string(),
            only_images: true,
            chunk_size: limits.chunk_size,
            max_payload_bytes: limits.max_payload_bytes,
            verify_existing: false,
        }
    }
}

impl UploadConfig {
    pub fn extract_limits(&self) -> ExtractLimits {
        ExtractLimits {
            chunk_size: self.chunk_size,
            max_payload_bytes: self.max_payload_bytes,
            ..ExtractLimits::default()
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding stored files
    pub path: String,

    /// Days a file is kept after it was written
    pub retention_days: u64,

    /// File names never deleted by cleanup or eviction
    pub ignore: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./files/".to_string(),
            retention_days: 14,
            ignore: vec![
                "index.html".to_string(),
                "style.css".to_string(),
                "failed.jpg".to_string(),
            ],
        }
    }
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * SECONDS_PER_DAY)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention(), self.ignore.iter().cloned())
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration, writing the defaults to `path` if it is missing.
    ///
    /// The flag is true when a default file was created.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool), ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }

        let config = Config::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, config.to_toml()?)?;
        Ok((config, true))
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind_addr()?;

        if !self.server.upload_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "upload_path must start with '/': {:?}",
                self.server.upload_path
            )));
        }

        if self.upload.chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be at least {} bytes",
                MIN_CHUNK_SIZE
            )));
        }

        if self.upload.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_payload_bytes must be greater than 0".to_string(),
            ));
        }

        if !(1..=MAX_RETENTION_DAYS).contains(&self.storage.retention_days) {
            return Err(ConfigError::Invalid(format!(
                "retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }

        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::Invalid("storage path is empty".to_string()));
        }

        Ok(())
    }
}
