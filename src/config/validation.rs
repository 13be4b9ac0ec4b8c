//! Configuration validation.
//!
//! Returns all validation errors, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::OrchestratorConfig;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be an absolute path, got {value}")]
    RelativePath { field: &'static str, value: String },

    #[error("invalid log level {0:?}")]
    LogLevel(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check value ranges and paths of a parsed config.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.boot.instance_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "boot.instance_timeout_secs",
        });
    }
    if config.schedule.evaluation_interval_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "schedule.evaluation_interval_secs",
        });
    }

    for (field, path) in [
        ("isolation.allowed_base_dir", &config.isolation.allowed_base_dir),
        ("isolation.config_root", &config.isolation.config_root),
    ] {
        if !path.is_absolute() {
            errors.push(ValidationError::RelativePath {
                field,
                value: path.display().to_string(),
            });
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
