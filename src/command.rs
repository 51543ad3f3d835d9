//! Service logic that runs an external program.
//!
//! Used by the `service-supervisor` binary: the worker runs the configured
//! program as a child and its exit status becomes the worker's outcome.
//! On the way out, the pre-exit hook asks the program to stop with SIGTERM.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;

use crate::lifecycle::Shutdown;
use crate::supervisor::launcher::ROLE_ENV;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program:?}: {source}")]
    Spawn {
        program: OsString,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for program: {0}")]
    Wait(#[source] std::io::Error),

    #[error("program exited with {0}")]
    Exited(ExitStatus),

    #[error("failed to signal program: {0}")]
    Signal(#[source] Errno),
}

struct Shared {
    pid: OnceLock<Pid>,
    exited: watch::Sender<bool>,
}

/// Runs the program to completion.
pub struct CommandTask {
    program: OsString,
    args: Vec<OsString>,
    shared: Arc<Shared>,
}

/// Stops the program started by a [`CommandTask`].
#[derive(Clone)]
pub struct CommandHandle {
    shared: Arc<Shared>,
}

impl CommandTask {
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> (Self, CommandHandle)
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let (exited, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            pid: OnceLock::new(),
            exited,
        });
        let task = Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            shared: shared.clone(),
        };
        (task, CommandHandle { shared })
    }

    /// Run the program. A non-zero exit is an error unless `shutdown` was
    /// triggered, in which case the program was asked to stop.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), CommandError> {
        let result = self.run_inner(&shutdown).await;
        self.shared.exited.send_replace(true);
        result
    }

    async fn run_inner(&self, shutdown: &Shutdown) -> Result<(), CommandError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env_remove(ROLE_ENV)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(pid) = child.id() {
            let _ = self.shared.pid.set(Pid::from_raw(pid as i32));
            tracing::info!(pid, program = ?self.program, "Program started");
        }

        let status = child.wait().await.map_err(CommandError::Wait)?;
        tracing::info!(status = %status, "Program exited");

        if status.success() || shutdown.is_triggered() {
            Ok(())
        } else {
            Err(CommandError::Exited(status))
        }
    }
}

impl CommandHandle {
    /// Send SIGTERM to the program and wait until it has exited.
    pub async fn stop(&self) -> Result<(), CommandError> {
        let mut exited = self.shared.exited.subscribe();
        if *exited.borrow() {
            return Ok(());
        }

        let Some(pid) = self.shared.pid.get().copied() else {
            return Ok(());
        };

        tracing::info!(pid = pid.as_raw(), "Sending SIGTERM to program");
        match kill(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(CommandError::Signal(e)),
        }

        // Sender dropped means the task is gone and so is the child.
        let _ = exited.wait_for(|done| *done).await;
        Ok(())
    }

    /// Send SIGKILL to the program unless it has already exited.
    pub fn kill(&self) {
        if *self.shared.exited.borrow() {
            return;
        }
        if let Some(pid) = self.shared.pid.get().copied() {
            tracing::warn!(pid = pid.as_raw(), "Killing program");
            let _ = kill(pid, Signal::SIGKILL);
        }
    }
}
