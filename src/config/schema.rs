//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a supervised
//! service. All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::timeouts::fraction_of;

/// Root configuration for a supervised service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name used in logs and for the generated unit file.
    pub name: String,

    /// Location of the pid-file holding the supervisor's pid.
    pub pid_file: PathBuf,

    /// Upper bound for the whole shutdown sequence, in milliseconds.
    pub stop_timeout_ms: u64,

    /// Delay before a crashed worker is restarted. Negative disables auto-restart.
    pub restart_delay_ms: i64,

    /// When set, the restart delay grows exponentially per consecutive crash
    /// and is capped at this value.
    pub max_restart_delay_ms: Option<u64>,

    /// Number of rapid consecutive crashes tolerated before giving up.
    pub max_consecutive_restart: u32,

    /// Worker uptime after which the restart budget is refilled.
    pub stability_window_ms: u64,

    /// Forward the worker's stdout to the supervisor's stdout.
    pub forward_stdout: bool,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Metrics exporter settings.
    pub metrics: MetricsConfig,

    /// Inputs for the generated service unit.
    pub unit: UnitConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "service".to_string(),
            pid_file: PathBuf::from("/var/run/service.pid"),
            stop_timeout_ms: 20_000,
            restart_delay_ms: 10_000,
            max_restart_delay_ms: None,
            max_consecutive_restart: 3,
            stability_window_ms: 10_000,
            forward_stdout: true,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            unit: UnitConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Overall bound on the supervisor's shutdown.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Time the supervisor races the termination handle against (16/17).
    pub fn termination_timeout(&self) -> Duration {
        fraction_of(self.stop_timeout(), 16, 17)
    }

    /// Time a worker gets to honour the stop message before SIGKILL (9/10).
    pub fn escalation_timeout(&self) -> Duration {
        fraction_of(self.stop_timeout(), 9, 10)
    }

    /// Bound on the worker's own exit sequence (8/10).
    pub fn worker_exit_timeout(&self) -> Duration {
        fraction_of(self.stop_timeout(), 8, 10)
    }

    /// Restart delay, or `None` when auto-restart is disabled.
    pub fn restart_delay(&self) -> Option<Duration> {
        u64::try_from(self.restart_delay_ms)
            .ok()
            .map(Duration::from_millis)
    }

    pub fn stability_window(&self) -> Duration {
        Duration::from_millis(self.stability_window_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,

    /// Default filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter listen address (e.g., "127.0.0.1:9100").
    pub address: Option<String>,
}

/// Inputs for the systemd unit generator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Human readable description.
    pub description: Option<String>,

    /// Full command line; defaults to the current executable.
    pub exec_start: Option<String>,

    pub user: Option<String>,

    pub group: Option<String>,

    pub working_directory: Option<PathBuf>,

    /// Extra environment variables.
    pub environment: BTreeMap<String, String>,

    /// systemd `Restart=` policy.
    pub restart: String,

    /// systemd `RestartSec=`.
    pub restart_sec: u64,

    /// systemd `WantedBy=` target.
    pub wanted_by: String,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            description: None,
            exec_start: None,
            user: None,
            group: None,
            working_directory: None,
            environment: BTreeMap::new(),
            restart: "always".to_string(),
            restart_sec: 10,
            wanted_by: "multi-user.target".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_timeouts() {
        let config = ServiceConfig {
            stop_timeout_ms: 17_000,
            ..ServiceConfig::default()
        };
        assert_eq!(config.termination_timeout(), Duration::from_millis(16_000));
        assert_eq!(config.escalation_timeout(), Duration::from_millis(15_300));
        assert_eq!(config.worker_exit_timeout(), Duration::from_millis(13_600));
        assert!(config.escalation_timeout() < config.termination_timeout());
    }

    #[test]
    fn test_negative_restart_delay_disables_restart() {
        let config = ServiceConfig {
            restart_delay_ms: -1,
            ..ServiceConfig::default()
        };
        assert_eq!(config.restart_delay(), None);

        let config = ServiceConfig {
            restart_delay_ms: 0,
            ..ServiceConfig::default()
        };
        assert_eq!(config.restart_delay(), Some(Duration::ZERO));
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ServiceConfig = toml::from_str("name = \"relay\"").unwrap();
        assert_eq!(config.name, "relay");
        assert_eq!(config.max_consecutive_restart, 3);
        assert_eq!(config.stability_window_ms, 10_000);
        assert!(config.forward_stdout);
        assert_eq!(config.unit.restart, "always");
    }
}
