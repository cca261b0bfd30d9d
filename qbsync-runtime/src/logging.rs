//! # Logging & Tracing Infrastructure
//!
//! Configures the `tracing-subscriber` stack for the sync core:
//! - Pretty, compact, or JSON output
//! - `RUST_LOG`-style directive filtering with a sensible default
//!
//! Token values never reach the logs: the auth types redact themselves in
//! their `Debug` implementations, so no filtering layer is needed here.
//!
//! ## Usage
//!
//! ```ignore
//! use qbsync_runtime::logging::{init_logging, LoggingConfig, LogFormat};
//!
//! init_logging(LoggingConfig::default().with_format(LogFormat::Json))
//!     .expect("Failed to initialize logging");
//! tracing::info!("sync core started");
//! ```

use crate::error::{Error, Result};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format for machine parsing
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter directives, e.g. `"info,qbsync_engine=debug"`.
    /// `RUST_LOG` overrides this when set.
    pub directives: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            directives: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = directives.into();
        self
    }
}

/// Initialize the global tracing subscriber.
///
/// Fails if a global subscriber is already installed, so call this once at
/// host startup.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.directives))
        .map_err(|e| Error::Logging(format!("invalid filter directives: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    result.map_err(|e| Error::Logging(format!("failed to install subscriber: {}", e)))?;
    tracing::debug!(format = ?config.format, "tracing subscriber installed");
    Ok(())
}
