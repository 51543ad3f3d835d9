//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name = "relay"
pid_file = "/tmp/relay.pid"
stop_timeout_ms = 5000
restart_delay_ms = -1

[logging]
format = "json"

[unit]
user = "relay"
environment = {{ RELAY_MODE = "prod" }}
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.name, "relay");
        assert_eq!(config.restart_delay(), None);
        assert_eq!(config.logging.format, crate::config::LogFormat::Json);
        assert_eq!(config.unit.user.as_deref(), Some("relay"));
        assert_eq!(config.unit.environment["RELAY_MODE"], "prod");
    }

    #[test]
    fn test_validation_errors_are_reported() {
        let err = parse_config("name = \"\"\nstop_timeout_ms = 1").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/service.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
