//! Configuration for the pipeline runner.
//!
//! A [`PipelineConfig`] is built once (from defaults, the environment or
//! deserialized settings), validated, and passed into the runner. It is never
//! read from a global.

use crate::error::ErrorContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Accepted values for [`PipelineConfig::log_level`].
pub const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Shortest API key accepted by [`PipelineConfig::require_api_key`].
pub const MIN_API_KEY_LEN: usize = 10;

/// Smallest accepted `timeout_seconds`.
pub const MIN_TIMEOUT_SECONDS: f64 = 0.001;

/// Prefix of every environment variable read by [`PipelineConfig::from_env`].
pub const ENV_PREFIX: &str = "SCOUT_";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("app_name cannot be empty")]
    EmptyAppName,

    #[error("timeout_seconds must be a finite number of at least {MIN_TIMEOUT_SECONDS}, got {0}")]
    InvalidTimeout(f64),

    #[error("session_ttl_seconds must be greater than 0")]
    InvalidSessionTtl,

    #[error("history_capacity must be greater than 0")]
    InvalidHistoryCapacity,

    #[error("cache_ttl_seconds must be greater than 0")]
    InvalidCacheTtl,

    #[error("max_concurrent_analyses must be between 1 and {max}, got {value}")]
    InvalidConcurrency { value: usize, max: usize },

    #[error("log_level must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL, got '{0}'")]
    InvalidLogLevel(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("API key is missing or shorter than {MIN_API_KEY_LEN} characters")]
    MissingCredential,

    #[error("analysis task '{task}' is unavailable: {reason}")]
    TaskUnavailable { task: String, reason: String },
}

impl From<ConfigError> for ErrorContext {
    fn from(err: ConfigError) -> Self {
        ErrorContext::config(format!("Invalid configuration: {}", err))
            .with_detail(format!("{:?}", err))
    }
}

/// Settings for the pipeline runner.
///
/// # Examples
///
/// ```ignore
/// use scout_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::new()
///     .with_max_retries(2)
///     .with_timeout_seconds(30.0)
///     .with_streaming(false);
/// config.validate()?;
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Application name stamped on every session.
    pub app_name: String,

    /// Additional attempts for a phase that timed out.
    ///
    /// **Default:** 3
    pub max_retries: u32,

    /// Time budget of the parallel phase, in seconds.
    ///
    /// **Default:** 120.0
    pub timeout_seconds: f64,

    /// Emit progress events to the registered observer.
    ///
    /// **Default:** `true`
    pub enable_streaming: bool,

    /// Session lifetime, in seconds.
    ///
    /// **Default:** 3600
    pub session_ttl_seconds: u64,

    /// Pause between retry attempts, in milliseconds.
    pub retry_delay_ms: u64,

    /// Number of completed runs kept by the in-memory history.
    pub history_capacity: usize,

    /// Reuse results of identical requests for `cache_ttl_seconds`.
    ///
    /// **Default:** `false`
    pub enable_caching: bool,

    /// Lifetime of a cached result, in seconds.
    pub cache_ttl_seconds: u64,

    /// Runs allowed to execute at the same time on one runner.
    ///
    /// **Default:** 5
    pub max_concurrent_analyses: usize,

    /// One of DEBUG, INFO, WARNING, ERROR, CRITICAL.
    pub log_level: String,

    /// Model used by analysis tasks. The pipeline itself never reads it.
    pub model_name: String,

    /// Credential used by analysis tasks. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            app_name: "product_scout".to_string(),
            max_retries: 3,
            timeout_seconds: 120.0,
            enable_streaming: true,
            session_ttl_seconds: 3600,
            retry_delay_ms: 0,
            history_capacity: 100,
            enable_caching: false,
            cache_ttl_seconds: 3600,
            max_concurrent_analyses: 5,
            log_level: "INFO".to_string(),
            model_name: "gemini-2.0-flash".to_string(),
            api_key: None,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: f64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_streaming(mut self, enable_streaming: bool) -> Self {
        self.enable_streaming = enable_streaming;
        self
    }

    pub fn with_session_ttl_seconds(mut self, session_ttl_seconds: u64) -> Self {
        self.session_ttl_seconds = session_ttl_seconds;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_history_capacity(mut self, history_capacity: usize) -> Self {
        self.history_capacity = history_capacity;
        self
    }

    pub fn with_caching(mut self, enable_caching: bool) -> Self {
        self.enable_caching = enable_caching;
        self
    }

    pub fn with_cache_ttl_seconds(mut self, cache_ttl_seconds: u64) -> Self {
        self.cache_ttl_seconds = cache_ttl_seconds;
        self
    }

    pub fn with_max_concurrent_analyses(mut self, max_concurrent_analyses: usize) -> Self {
        self.max_concurrent_analyses = max_concurrent_analyses;
        self
    }

    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// The parallel-phase time budget. Only meaningful on a validated config.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::MAX)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Checks every field. Called by the runner before the first run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::EmptyAppName);
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds < MIN_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }
        if self.session_ttl_seconds == 0 {
            return Err(ConfigError::InvalidSessionTtl);
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidHistoryCapacity);
        }
        if self.cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidCacheTtl);
        }
        if !(1..=Semaphore::MAX_PERMITS).contains(&self.max_concurrent_analyses) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent_analyses,
                max: Semaphore::MAX_PERMITS,
            });
        }
        if !LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }
        Ok(())
    }

    /// Returns the API key, failing if it is absent or implausibly short.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if key.len() >= MIN_API_KEY_LEN => Ok(key),
            _ => Err(ConfigError::MissingCredential),
        }
    }

    /// Loads the configuration from `SCOUT_*` environment variables.
    ///
    /// Unset variables keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading from an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };
        let mut config = Self::new();

        if let Some((_, value)) = get("APP_NAME") {
            config.app_name = value;
        }
        if let Some((key, value)) = get("MAX_RETRIES") {
            config.max_retries = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("TIMEOUT_SECONDS") {
            config.timeout_seconds = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("ENABLE_STREAMING") {
            config.enable_streaming = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("SESSION_TTL") {
            config.session_ttl_seconds = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("RETRY_DELAY_MS") {
            config.retry_delay_ms = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("HISTORY_CAPACITY") {
            config.history_capacity = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("ENABLE_CACHING") {
            config.enable_caching = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get("CACHE_TTL") {
            config.cache_ttl_seconds = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("MAX_CONCURRENT") {
            config.max_concurrent_analyses = parse(&key, &value)?;
        }
        if let Some((_, value)) = get("LOG_LEVEL") {
            config.log_level = value.trim().to_uppercase();
        }
        if let Some((_, value)) = get("MODEL_NAME") {
            config.model_name = value;
        }
        if let Some((_, value)) = get("API_KEY") {
            config.api_key = Some(value).filter(|v| !v.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("app_name", &self.app_name)
            .field("max_retries", &self.max_retries)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("enable_streaming", &self.enable_streaming)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("history_capacity", &self.history_capacity)
            .field("enable_caching", &self.enable_caching)
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("max_concurrent_analyses", &self.max_concurrent_analyses)
            .field("log_level", &self.log_level)
            .field("model_name", &self.model_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
