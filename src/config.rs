//! # Configuration Management
//!
//! Centralized configuration for the bridge-link engine.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()` (`BRIDGELINK_*`)
//! - Direct instantiation with defaults
//!
//! Validation catches the usual misconfigurations (bad address, zero-sized
//! pool, identity strings the wire format cannot carry) before a connect is
//! attempted.

use crate::core::wire::MAX_STR_LEN;
use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Loopback address and private port of the bridge process.
pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:25535";

/// Identity string sent in the `Connect` packet.
pub const DEFAULT_IDENTITY: &str = "BridgeLink/Rust/0.1.0";

/// Worker threads per engine: connect + reader + writer + handshake.
pub const DEFAULT_WORKERS: usize = 4;

/// Main configuration structure containing all configurable settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LinkConfig {
    /// Bridge endpoint configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Client-side configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LinkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| LinkError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| LinkError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| LinkError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BRIDGELINK_BRIDGE_ADDRESS") {
            config.bridge.address = addr;
        }

        if let Ok(timeout) = std::env::var("BRIDGELINK_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.bridge.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(identity) = std::env::var("BRIDGELINK_CLIENT_IDENTITY") {
            config.client.identity = identity;
        }

        if let Ok(workers) = std::env::var("BRIDGELINK_WORKERS") {
            if let Ok(val) = workers.parse::<usize>() {
                config.client.workers = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common misconfigurations.
    ///
    /// Returns a list of validation errors; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.bridge.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LinkError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Bridge endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Bridge address (e.g., "127.0.0.1:25535")
    pub address: String,

    /// Timeout for the socket open
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_BRIDGE_ADDR),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    /// Validate bridge configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Bridge address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid bridge address format: '{}' (expected format: '127.0.0.1:25535')",
                self.address
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        errors
    }
}

/// Client-side configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Identity string carried in the `Connect` packet
    pub identity: String,

    /// Worker threads in the engine's pool
    pub workers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: String::from(DEFAULT_IDENTITY),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.identity.is_empty() {
            errors.push("Client identity cannot be empty".to_string());
        } else if self.identity.len() > MAX_STR_LEN {
            errors.push(format!(
                "Client identity too long: {} bytes (wire maximum: {MAX_STR_LEN})",
                self.identity.len()
            ));
        }

        if self.workers < DEFAULT_WORKERS {
            errors.push(format!(
                "Worker pool too small: {} (connect, reader, writer and handshake need {DEFAULT_WORKERS})",
                self.workers
            ));
        } else if self.workers > 64 {
            errors.push(format!("Worker pool very large: {}", self.workers));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("bridgelink"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization (milliseconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
