//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, delays coherent)
//! - Check that names are usable as unit file names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

const MIN_STOP_TIMEOUT_MS: u64 = 100;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must be non-empty and contain no whitespace or '/' (got {0:?})")]
    InvalidName(String),

    #[error("pid_file must not be empty")]
    EmptyPidFile,

    #[error("stop_timeout_ms must be at least {MIN_STOP_TIMEOUT_MS} (got {0})")]
    StopTimeoutTooShort(u64),

    #[error("stability_window_ms must be greater than zero")]
    ZeroStabilityWindow,

    #[error("max_restart_delay_ms ({max}) is lower than restart_delay_ms ({base})")]
    RestartDelayCap { base: i64, max: u64 },

    #[error("metrics.address {0:?} is not a valid socket address")]
    MetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.name.is_empty()
        || config
            .name
            .chars()
            .any(|c| c.is_whitespace() || c == '/')
    {
        errors.push(ValidationError::InvalidName(config.name.clone()));
    }

    if config.pid_file.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyPidFile);
    }

    if config.stop_timeout_ms < MIN_STOP_TIMEOUT_MS {
        errors.push(ValidationError::StopTimeoutTooShort(config.stop_timeout_ms));
    }

    if config.stability_window_ms == 0 {
        errors.push(ValidationError::ZeroStabilityWindow);
    }

    if let Some(max) = config.max_restart_delay_ms {
        if config.restart_delay_ms > 0 && (config.restart_delay_ms as u64) > max {
            errors.push(ValidationError::RestartDelayCap {
                base: config.restart_delay_ms,
                max,
            });
        }
    }

    if let Some(address) = &config.metrics.address {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::MetricsAddress(address.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.name = "my service".into();
        config.stop_timeout_ms = 10;
        config.stability_window_ms = 0;
        config.metrics.address = Some("nowhere".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::StopTimeoutTooShort(10)));
        assert!(errors.contains(&ValidationError::ZeroStabilityWindow));
    }

    #[test]
    fn test_restart_delay_cap() {
        let mut config = ServiceConfig::default();
        config.restart_delay_ms = 5_000;
        config.max_restart_delay_ms = Some(1_000);
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::RestartDelayCap {
                base: 5_000,
                max: 1_000
            }])
        );

        config.restart_delay_ms = -1;
        assert_eq!(validate_config(&config), Ok(()));
    }
}
