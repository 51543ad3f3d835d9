//! A spawned worker process, seen from the supervisor.
//!
//! # Responsibilities
//! - Spawn the worker with a piped stdin as control channel
//! - Watch for its exit and publish it
//! - On stop request: write the stop message, SIGKILL after the escalation delay

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::observability::metrics;
use crate::resilience::timeouts::{race_deadline, Elapsed};
use crate::supervisor::handle::{TerminationHandle, WorkerExit};
use crate::supervisor::launcher::{WorkerLauncher, INSTANCE_ENV};
use crate::worker::channel::STOP_MESSAGE;

/// A running worker that is not watched yet.
pub struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    pid: u32,
    started: Instant,
}

/// A watched worker: its termination handle and exit notifications.
pub struct WatchedWorker {
    pub pid: u32,
    pub started: Instant,
    pub handle: TerminationHandle,
    pub exit: watch::Receiver<Option<WorkerExit>>,
}

impl WorkerProcess {
    pub fn spawn(
        launcher: &dyn WorkerLauncher,
        forward_stdout: bool,
        instance_id: Uuid,
    ) -> io::Result<Self> {
        let mut command = launcher.command()?;
        command
            .env(INSTANCE_ENV, instance_id.to_string())
            .stdin(Stdio::piped())
            .stdout(if forward_stdout {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::inherit());

        let mut child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::Other, "worker exited before reporting a pid")
            })?;
        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            pid,
            started: Instant::now(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Hand the process to a monitor task.
    ///
    /// `escalation` is how long the worker gets between the stop message and SIGKILL.
    pub fn watch(self, escalation: Duration) -> WatchedWorker {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (exit_tx, exit_rx) = watch::channel(None);

        let WorkerProcess {
            child,
            stdin,
            pid,
            started,
        } = self;

        tokio::spawn(monitor(child, stdin, pid, escalation, stop_rx, exit_tx));

        WatchedWorker {
            pid,
            started,
            handle: TerminationHandle::worker(pid, stop_tx, exit_rx.clone()),
            exit: exit_rx,
        }
    }
}

async fn monitor(
    mut child: Child,
    mut stdin: Option<ChildStdin>,
    pid: u32,
    escalation: Duration,
    mut stop_rx: mpsc::Receiver<()>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(exit_from_status(pid, status, false)),
        Some(()) = stop_rx.recv() => None,
    };
    let exit = match exited {
        Some(exit) => exit,
        None => stop(&mut child, &mut stdin, pid, escalation).await,
    };

    tracing::debug!(pid, code = ?exit.code, forced = exit.forced, "Worker exit observed");
    exit_tx.send_replace(Some(exit));
}

async fn stop(
    child: &mut Child,
    stdin: &mut Option<ChildStdin>,
    pid: u32,
    escalation: Duration,
) -> WorkerExit {
    tracing::info!(pid, "Asking worker to stop");
    // stdin stays open until the worker is gone: closing it reads as a disconnect.
    if let Some(stdin) = stdin.as_mut() {
        let message = format!("{STOP_MESSAGE}\n");
        if let Err(e) = stdin.write_all(message.as_bytes()).await {
            tracing::debug!(pid, error = %e, "Failed to deliver stop message");
        }
        let _ = stdin.flush().await;
    }

    match race_deadline(escalation, child.wait()).await {
        Ok(status) => exit_from_status(pid, status, false),
        Err(Elapsed) => {
            tracing::warn!(
                pid,
                escalation_ms = escalation.as_millis() as u64,
                "Worker did not stop in time, killing it"
            );
            metrics::record_forced_kill();
            if let Err(e) = child.start_kill() {
                tracing::error!(pid, error = %e, "Failed to kill worker");
            }
            let status = child.wait().await;
            exit_from_status(pid, status, true)
        }
    }
}

fn exit_from_status(pid: u32, status: io::Result<ExitStatus>, forced: bool) -> WorkerExit {
    match status {
        Ok(status) => WorkerExit {
            code: status.code(),
            forced,
        },
        Err(e) => {
            tracing::error!(pid, error = %e, "Failed to wait for worker");
            WorkerExit { code: None, forced }
        }
    }
}
