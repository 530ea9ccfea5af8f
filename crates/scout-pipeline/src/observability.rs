//! # Observability
//!
//! Installs a `tracing` subscriber for the pipeline's structured logs.
//!
//! The pipeline logs phase transitions and run completion at `info`, task
//! failures, timeouts and retries at `warn`, and per-task details at `debug`.
//! Each analysis task runs inside an `analysis_task` span and each run inside
//! a `run_analysis` span.

use crate::config::ConfigError;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum log level to capture.
    pub level: Level,
    /// The target for the logs.
    pub target: LogTarget,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
        }
    }
}

impl ObservabilityConfig {
    /// Maps a configured log level name (DEBUG, INFO, WARNING, ERROR,
    /// CRITICAL; any case) onto a tracing level. CRITICAL has no tracing
    /// counterpart and maps to `ERROR`.
    pub fn from_log_level(name: &str) -> Result<Self, ConfigError> {
        let level = match name.trim().to_uppercase().as_str() {
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "WARNING" | "WARN" => Level::WARN,
            "ERROR" | "CRITICAL" => Level::ERROR,
            _ => return Err(ConfigError::InvalidLogLevel(name.to_string())),
        };
        Ok(Self {
            level,
            target: LogTarget::default(),
        })
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to the console (stdout).
    #[default]
    Console,
    /// Log to a file.
    File(String),
}

/// Initializes the global tracing subscriber.
///
/// Call once at the beginning of `main`. Returns an error, rather than
/// panicking, if a global subscriber is already installed or the log file
/// cannot be created.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let directive = format!("scout_pipeline={}", config.level).parse()?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.target {
        LogTarget::Console => {
            let layer = fmt::layer().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        LogTarget::File(path) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(file);
            subscriber.with(layer).try_init()?;
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_log_level() {
        assert_eq!(
            ObservabilityConfig::from_log_level("debug").unwrap().level,
            Level::DEBUG
        );
        assert_eq!(
            ObservabilityConfig::from_log_level("WARNING").unwrap().level,
            Level::WARN
        );
        assert_eq!(
            ObservabilityConfig::from_log_level("critical").unwrap().level,
            Level::ERROR
        );
        assert!(ObservabilityConfig::from_log_level("loud").is_err());
    }

    #[test]
    fn test_second_init_is_an_error() {
        let _ = init(ObservabilityConfig::default());
        assert!(init(ObservabilityConfig::default()).is_err());
    }
}
