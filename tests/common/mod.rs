//! Shared utilities for supervision integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use service_supervisor::config::ServiceConfig;
use service_supervisor::supervisor::CommandLauncher;
use tempfile::TempDir;

/// A scratch directory holding the pid-file and whatever the worker scripts write.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.path("service.pid")
    }

    /// Config with short timeouts, suitable for tests.
    pub fn config(&self) -> ServiceConfig {
        ServiceConfig {
            name: "test-service".to_string(),
            pid_file: self.pid_file(),
            stop_timeout_ms: 2_000,
            restart_delay_ms: 10,
            max_consecutive_restart: 3,
            stability_window_ms: 10_000,
            forward_stdout: false,
            ..ServiceConfig::default()
        }
    }

    /// Number of lines in `name`, 0 when it does not exist.
    pub fn line_count(&self, name: &str) -> usize {
        std::fs::read_to_string(self.path(name))
            .map(|content| content.lines().count())
            .unwrap_or(0)
    }
}

/// Launcher running `script` with `sh -c`.
pub fn sh(script: impl Into<String>) -> CommandLauncher {
    CommandLauncher::new("sh", ["-c".to_string(), script.into()])
}

/// Poll `condition` until it holds; panic after `timeout`.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() > deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
