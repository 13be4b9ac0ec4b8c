//! Configuration schema definitions.
//!
//! This module defines the tunable constants of the orchestrator.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pre-start isolation checks.
    pub isolation: IsolationConfig,

    /// Boot sequence settings.
    pub boot: BootConfig,

    /// Schedule evaluator settings.
    pub schedule: ScheduleConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// JSON inventory used to seed the in-memory entity store.
    pub inventory_path: Option<PathBuf>,
}

/// Isolation verifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Every instance binary must resolve strictly beneath this directory.
    pub allowed_base_dir: PathBuf,

    /// Root of the fallback config layout `<root>/<instance_id>/config/<file>`.
    pub config_root: PathBuf,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            allowed_base_dir: PathBuf::from("/data/services"),
            config_root: PathBuf::from("/data/services"),
        }
    }
}

/// Boot sequence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootConfig {
    /// Per-instance start (including health wait) deadline in seconds.
    pub instance_timeout_secs: u64,
}

impl BootConfig {
    pub fn instance_timeout(&self) -> Duration {
        Duration::from_secs(self.instance_timeout_secs)
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            instance_timeout_secs: 60,
        }
    }
}

/// Schedule evaluator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between evaluation ticks.
    pub evaluation_interval_secs: u64,

    /// Router/system clock difference above which a warning is logged.
    pub max_clock_skew_secs: u64,
}

impl ScheduleConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 60,
            max_clock_skew_secs: 300,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tunable_constants() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.isolation.allowed_base_dir, PathBuf::from("/data/services"));
        assert_eq!(config.boot.instance_timeout(), Duration::from_secs(60));
        assert_eq!(config.schedule.evaluation_interval(), Duration::from_secs(60));
        assert_eq!(config.schedule.max_clock_skew(), Duration::from_secs(300));
        assert!(config.inventory_path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            [schedule]
            evaluation_interval_secs = 30

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.schedule.evaluation_interval_secs, 30);
        assert_eq!(config.schedule.max_clock_skew_secs, 300);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.boot.instance_timeout_secs, 60);
    }
}
