//! Tracing initialization.
//!
//! Sets up a `tracing-subscriber` registry with an `EnvFilter` and one fmt
//! layer in the configured [`LogFormat`]. `RUST_LOG`, when set, takes
//! precedence over the configured level.
//!
//! # Example
//! ```no_run
//! use rust_scan::config::ScanConfig;
//! use rust_scan::logging;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScanConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("session starting");
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ScanConfig;
use crate::error::{AppResult, ScanError};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored (interactive use)
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// `[logging]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Line format
    pub format: LogFormat,
    /// Colors in pretty output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Configuration at `level`, other settings default.
    #[must_use]
    pub fn new(level: &str) -> Self {
        Self {
            level: level.to_string(),
            ..Self::default()
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// The level as a `tracing` level.
    pub fn level(&self) -> AppResult<Level> {
        parse_log_level(&self.level)
    }
}

/// Initialize tracing from the loaded configuration.
pub fn init_from_config(config: &ScanConfig) -> AppResult<()> {
    init(&config.logging)
}

/// Initialize tracing.
///
/// Idempotent: if a global subscriber is already installed this returns
/// `Ok(())`, so tests and embedding applications can call it freely.
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let level = config.level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(config.ansi)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .or_else(|e| {
            if e.to_string().contains("a global default trace dispatcher has already been set") {
                Ok(())
            } else {
                Err(ScanError::Configuration(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        })
}

/// Parse a log level name, case-insensitively.
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ScanError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("Warn"), Ok(Level::WARN)));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::new("debug").with_format(LogFormat::Json);
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }

    #[test]
    fn test_bad_level_rejected_before_install() {
        let config = LoggingConfig::new("loud");
        assert!(matches!(init(&config), Err(ScanError::Configuration(_))));
    }
}
