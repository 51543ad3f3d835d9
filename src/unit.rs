//! systemd unit generation.
//!
//! The unit wires the supervisor's graceful-stop signal and a stop timeout
//! slightly above `stop_timeout` into systemd, so systemd never SIGKILLs the
//! supervisor before its own escalation has run.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ServiceConfig;
use crate::lifecycle::GRACEFUL_STOP;

/// Where the unit for `name` is installed.
pub fn unit_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/etc/systemd/system/{name}.service"))
}

/// Command line starting `service-supervisor` with `config_path` around `command`.
pub fn exec_start_for<S: AsRef<OsStr>>(
    binary: &Path,
    config_path: &Path,
    command: &[S],
) -> String {
    let mut parts = vec![
        quote(binary.as_os_str()),
        "--config".to_string(),
        quote(config_path.as_os_str()),
    ];
    if !command.is_empty() {
        parts.push("--".to_string());
        parts.extend(command.iter().map(|arg| quote(arg.as_ref())));
    }
    parts.join(" ")
}

fn quote(arg: &OsStr) -> String {
    let arg = arg.to_string_lossy();
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        return arg.into_owned();
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// A rendered-on-demand systemd service unit.
#[derive(Debug, Clone)]
pub struct ServiceUnit {
    pub description: String,
    pub exec_start: String,
    pub user: Option<String>,
    pub group: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    pub timeout_stop_sec: u64,
    pub restart: String,
    pub restart_sec: u64,
    pub wanted_by: String,
}

impl ServiceUnit {
    /// Build the unit from `config`. `exec_start` is used when the config
    /// does not name one.
    pub fn from_config(config: &ServiceConfig, exec_start: String) -> Self {
        let unit = &config.unit;
        Self {
            description: unit
                .description
                .clone()
                .unwrap_or_else(|| format!("{} (supervised)", config.name)),
            exec_start: unit.exec_start.clone().unwrap_or(exec_start),
            user: unit.user.clone(),
            group: unit.group.clone(),
            working_directory: unit.working_directory.clone(),
            environment: unit.environment.clone(),
            timeout_stop_sec: config.stop_timeout_ms.div_ceil(1000) + 1,
            restart: unit.restart.clone(),
            restart_sec: unit.restart_sec,
            wanted_by: unit.wanted_by.clone(),
        }
    }
}

impl fmt::Display for ServiceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Unit]")?;
        writeln!(f, "Description={}", self.description)?;
        writeln!(f, "After=network.target")?;
        writeln!(f)?;

        writeln!(f, "[Service]")?;
        writeln!(f, "Type=simple")?;
        writeln!(f, "ExecStart={}", self.exec_start)?;
        if let Some(user) = &self.user {
            writeln!(f, "User={user}")?;
        }
        if let Some(group) = &self.group {
            writeln!(f, "Group={group}")?;
        }
        if let Some(dir) = &self.working_directory {
            writeln!(f, "WorkingDirectory={}", dir.display())?;
        }
        for (key, value) in &self.environment {
            writeln!(f, "Environment=\"{key}={value}\"")?;
        }
        // Signal the supervisor only; it stops the worker itself.
        writeln!(f, "KillMode=mixed")?;
        writeln!(f, "KillSignal={}", GRACEFUL_STOP.as_str())?;
        writeln!(f, "TimeoutStopSec={}", self.timeout_stop_sec)?;
        writeln!(f, "Restart={}", self.restart)?;
        writeln!(f, "RestartSec={}", self.restart_sec)?;
        writeln!(f)?;

        writeln!(f, "[Install]")?;
        writeln!(f, "WantedBy={}", self.wanted_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults() {
        let config = ServiceConfig {
            name: "relay".to_string(),
            stop_timeout_ms: 20_000,
            ..ServiceConfig::default()
        };
        let rendered = ServiceUnit::from_config(&config, "/usr/bin/relay".to_string()).to_string();

        assert!(rendered.contains("Description=relay (supervised)\n"));
        assert!(rendered.contains("ExecStart=/usr/bin/relay\n"));
        assert!(rendered.contains("KillMode=mixed\n"));
        assert!(rendered.contains("KillSignal=SIGUSR2\n"));
        assert!(rendered.contains("TimeoutStopSec=21\n"));
        assert!(rendered.contains("Restart=always\n"));
        assert!(rendered.contains("RestartSec=10\n"));
        assert!(rendered.contains("WantedBy=multi-user.target"));
        assert!(!rendered.contains("User="));
    }

    #[test]
    fn test_stop_timeout_rounds_up() {
        let config = ServiceConfig {
            stop_timeout_ms: 1_500,
            ..ServiceConfig::default()
        };
        let unit = ServiceUnit::from_config(&config, String::new());
        assert_eq!(unit.timeout_stop_sec, 3);
    }

    #[test]
    fn test_render_optional_fields() {
        let mut config = ServiceConfig::default();
        config.unit.user = Some("svc".to_string());
        config.unit.exec_start = Some("/opt/svc/run".to_string());
        config.unit.environment.insert("MODE".to_string(), "prod".to_string());

        let rendered = ServiceUnit::from_config(&config, "/ignored".to_string()).to_string();
        assert!(rendered.contains("ExecStart=/opt/svc/run\n"));
        assert!(rendered.contains("User=svc\n"));
        assert!(rendered.contains("Environment=\"MODE=prod\"\n"));
    }

    #[test]
    fn test_exec_start_quotes_arguments() {
        let line = exec_start_for(
            Path::new("/usr/bin/service-supervisor"),
            Path::new("/etc/svc.toml"),
            &["node", "my app.js"],
        );
        assert_eq!(
            line,
            "/usr/bin/service-supervisor --config /etc/svc.toml -- node \"my app.js\""
        );
    }

    #[test]
    fn test_unit_path() {
        assert_eq!(unit_path("relay"), PathBuf::from("/etc/systemd/system/relay.service"));
    }
}
