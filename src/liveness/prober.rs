//! Liveness probing of the process recorded in a pid-file.
//!
//! # Responsibilities
//! - Decide whether the recorded process is alive (zero-effect signal)
//! - Remove stale pid-files as a side effect
//! - Ask the recorded process to stop and wait until it is gone
//!
//! # Design Decisions
//! - EPERM counts as alive: the pid exists but belongs to another user
//! - `request_stop` has no upper bound; callers wrap it when they need one

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::{Result, SupervisorError};
use crate::liveness::pid_file::PidFile;

/// Interval between liveness probes while waiting for a process to exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Probe `pid` with signal 0.
pub fn is_alive(pid: Pid) -> bool {
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Pid of the live process recorded in `pid_file`, if any.
///
/// A pid-file naming a dead process, or holding garbage, is deleted.
pub fn running_pid(pid_file: &PidFile) -> Option<Pid> {
    let pid = match pid_file.read() {
        Ok(Some(pid)) => pid,
        Ok(None) => return None,
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            tracing::warn!(path = ?pid_file.path(), error = %e, "Removing unreadable pid file");
            remove_stale(pid_file);
            return None;
        }
        Err(e) => {
            tracing::warn!(path = ?pid_file.path(), error = %e, "Failed to read pid file");
            return None;
        }
    };

    if is_alive(pid) {
        return Some(pid);
    }

    if pid_file.exists() {
        tracing::info!(pid = pid.as_raw(), path = ?pid_file.path(), "Removing stale pid file");
        remove_stale(pid_file);
    }
    None
}

/// Whether a live process is recorded in `pid_file`.
pub fn is_running(pid_file: &PidFile) -> bool {
    running_pid(pid_file).is_some()
}

/// Send `signal` to the recorded process and wait until it is gone.
///
/// Returns immediately when nothing is running.
pub async fn request_stop(pid_file: &PidFile, signal: Signal) -> Result<()> {
    let Some(pid) = running_pid(pid_file) else {
        return Ok(());
    };

    tracing::info!(pid = pid.as_raw(), signal = %signal, "Requesting running instance to stop");
    match kill(pid, signal) {
        // Exited between the probe and the signal.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(source) => {
            return Err(SupervisorError::Signal {
                pid: pid.as_raw(),
                source,
            })
        }
    }

    while is_running(pid_file) {
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    tracing::info!(pid = pid.as_raw(), "Previous instance is gone");
    Ok(())
}

fn remove_stale(pid_file: &PidFile) {
    if let Err(e) = pid_file.remove() {
        tracing::warn!(path = ?pid_file.path(), error = %e, "Failed to remove stale pid file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn dead_pid() -> Pid {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_missing_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("svc.pid"));
        assert!(!is_running(&pid_file));
    }

    #[test]
    fn test_live_pid_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("svc.pid"));
        pid_file.write(Pid::this()).unwrap();

        assert_eq!(running_pid(&pid_file), Some(Pid::this()));
        assert!(pid_file.exists());
    }

    #[test]
    fn test_stale_pid_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("svc.pid"));
        pid_file.write(dead_pid()).unwrap();

        assert!(!is_running(&pid_file));
        assert!(!pid_file.exists());
    }

    #[test]
    fn test_garbage_pid_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("svc.pid"));
        std::fs::write(pid_file.path(), "not-a-pid").unwrap();

        assert!(!is_running(&pid_file));
        assert!(!pid_file.exists());
    }

    #[tokio::test]
    async fn test_request_stop_on_dead_pid_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("svc.pid"));
        pid_file.write(dead_pid()).unwrap();

        let started = Instant::now();
        request_stop(&pid_file, Signal::SIGUSR2).await.unwrap();
        assert!(started.elapsed() < POLL_INTERVAL);
        assert!(!pid_file.exists());
    }

    #[tokio::test]
    async fn test_request_stop_waits_for_live_process() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("svc.pid"));

        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = Pid::from_raw(child.id().unwrap() as i32);
        let reaper = tokio::spawn(async move { child.wait().await });
        pid_file.write(pid).unwrap();

        tokio::time::timeout(Duration::from_secs(10), request_stop(&pid_file, Signal::SIGTERM))
            .await
            .expect("stop request should finish")
            .unwrap();

        assert!(!pid_file.exists());
        let status = reaper.await.unwrap().unwrap();
        assert!(!status.success());
    }
}
