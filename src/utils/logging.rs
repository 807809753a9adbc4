//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber built from [`LoggingConfig`]. The
//! `RUST_LOG` environment variable, when set, overrides the configured level.

use crate::config::LoggingConfig;
use crate::error::{LinkError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// # Errors
/// Returns [`LinkError::ConfigError`] when a subscriber is already installed
/// for this process.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let installed = if config.json_format {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    installed.map_err(|e| LinkError::ConfigError(format!("failed to install subscriber: {e}")))
}
