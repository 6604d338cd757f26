//! Configuration module for the trade orchestrator.
//!
//! Loads YAML configuration with environment variable interpolation and
//! validates it before any component is built.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trade_orchestrator::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! println!("max retries: {}", config.retry.max_retries);
//! ```

mod automation;
mod feed;
mod observability;
mod orchestrator;
mod retry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use automation::AutomationConfig;
pub use feed::FeedConfig;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use orchestrator::OrchestratorConfig;
pub use retry::RetryConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Retry and pacing for backend calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Live feed settings.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Automation scheduler settings.
    #[serde(default)]
    pub automation: AutomationConfig,
    /// Orchestrator timing.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let retry = &config.retry;
    if retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "retry.backoff_multiplier must be at least 1.0".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&retry.jitter_factor) {
        return Err(ConfigError::ValidationError(
            "retry.jitter_factor must be in [0.0, 1.0)".to_string(),
        ));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(ConfigError::ValidationError(
            "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
        ));
    }
    if retry.call_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "retry.call_timeout_ms must be positive".to_string(),
        ));
    }

    if config.feed.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "feed.channel_capacity must be positive".to_string(),
        ));
    }
    if config.feed.subscribe_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "feed.subscribe_timeout_ms must be positive".to_string(),
        ));
    }

    if config.automation.reconcile_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "automation.reconcile_interval_ms must be positive".to_string(),
        ));
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.fill_poll_interval_ms == 0 || orchestrator.session_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator poll intervals must be positive".to_string(),
        ));
    }

    let valid_formats = ["pretty", "json"];
    if !valid_formats.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {valid_formats:?}"
        )));
    }

    Ok(())
}
