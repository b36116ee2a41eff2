//! Log subscriber bootstrap.
//!
//! Library code only emits `tracing` events. Binaries and tests call
//! [`init_logging`] once to install a subscriber built from
//! [`LoggingConfig`]; `RUST_LOG`, when set, takes precedence over the
//! configured level.

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the level filter for `config`.
///
/// # Errors
/// Returns `Configuration` when neither `RUST_LOG` nor the configured level
/// is a valid filter directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Configuration(format!("Invalid log level '{}': {e}", config.level)))
}

/// Install the global subscriber.
///
/// # Errors
/// Returns `Configuration` for an invalid level or when a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;

    let fmt_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| Error::Configuration(format!("Failed to install log subscriber: {e}")))?;

    tracing::info!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}
