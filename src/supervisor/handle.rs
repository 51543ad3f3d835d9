//! Termination handle: the capability to stop the current worker.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{mpsc, watch};

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Whether the supervisor had to SIGKILL it.
    pub forced: bool,
}

impl WorkerExit {
    /// Code reported when the worker was asked to stop.
    pub fn termination_code(&self) -> i32 {
        if self.forced {
            1
        } else {
            self.code.unwrap_or(0)
        }
    }

    /// Code recorded when the worker died on its own.
    pub fn crash_code(&self) -> i32 {
        self.code.unwrap_or(1)
    }
}

/// Wait until the worker's exit has been published.
pub(crate) async fn observed_exit(exit: &mut watch::Receiver<Option<WorkerExit>>) -> WorkerExit {
    match exit.wait_for(Option::is_some).await {
        Ok(exit) => (*exit).unwrap_or(WorkerExit {
            code: None,
            forced: false,
        }),
        // Monitor vanished without reporting.
        Err(_) => WorkerExit {
            code: None,
            forced: false,
        },
    }
}

#[derive(Debug)]
enum Inner {
    Worker {
        pid: u32,
        stop: mpsc::Sender<()>,
        exit: watch::Receiver<Option<WorkerExit>>,
    },
    Exited(i32),
}

/// Stops the worker gracefully, escalating to SIGKILL, and yields its code.
#[derive(Debug)]
pub struct TerminationHandle {
    inner: Inner,
}

impl TerminationHandle {
    pub(crate) fn worker(
        pid: u32,
        stop: mpsc::Sender<()>,
        exit: watch::Receiver<Option<WorkerExit>>,
    ) -> Self {
        Self {
            inner: Inner::Worker { pid, stop, exit },
        }
    }

    /// A no-op handle for a worker that already exited with `code`.
    pub fn exited(code: i32) -> Self {
        Self {
            inner: Inner::Exited(code),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match &self.inner {
            Inner::Worker { pid, .. } => Some(*pid),
            Inner::Exited(_) => None,
        }
    }

    /// Ask the worker to stop without waiting.
    pub fn request_stop(&self) {
        if let Inner::Worker { stop, .. } = &self.inner {
            // Full: already requested. Closed: already exited.
            let _ = stop.try_send(());
        }
    }

    /// Stop the worker and wait for its exit code.
    pub async fn terminate(&self) -> i32 {
        match &self.inner {
            Inner::Exited(code) => *code,
            Inner::Worker { exit, .. } => {
                self.request_stop();
                let mut exit = exit.clone();
                observed_exit(&mut exit).await.termination_code()
            }
        }
    }
}

/// Slot holding the handle of the current worker, if any.
#[derive(Default)]
pub struct HandleSlot(ArcSwapOption<TerminationHandle>);

impl HandleSlot {
    pub fn install(&self, handle: Arc<TerminationHandle>) {
        self.0.store(Some(handle));
    }

    pub fn clear(&self) {
        self.0.store(None);
    }

    pub fn current(&self) -> Option<Arc<TerminationHandle>> {
        self.0.load_full()
    }
}
