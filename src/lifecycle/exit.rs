//! Exit coordination: the single-shot termination funnel of a process.
//!
//! # Responsibilities
//! - Collect exit causes (OS signals, faults, natural completion)
//! - Act on the first qualifying cause only; log and discard the rest
//! - Run the registered exit task under a deadline
//! - Resolve the process exit code
//!
//! # State Transitions
//! ```text
//! Listening → (first qualifying cause) → Exiting → (task done | deadline) → code
//! ```
//!
//! # Design Decisions
//! - Causes arrive over one mpsc channel; `ExitTrigger` is the only way in
//! - The task runs in its own tokio task so a panic becomes a fault code, not a hang
//! - The coordinator returns the code; the binary calls `process::exit` with it

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{BoxError, SupervisorError};
use crate::lifecycle::signals::SignalListener;
use crate::observability::metrics;
use crate::resilience::timeouts::{race_deadline, Elapsed};

/// An error that ended (or is ending) the process.
#[derive(Clone)]
pub struct Fault(Arc<dyn Error + Send + Sync + 'static>);

impl Fault {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(Arc::from(error.into()))
    }

    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<SupervisorError> for Fault {
    fn from(error: SupervisorError) -> Self {
        Self::new(error)
    }
}

/// Why the process is exiting.
#[derive(Debug, Clone)]
pub enum ExitCause {
    /// An OS signal, by name (e.g. "SIGUSR2").
    Signal(&'static str),
    /// An error nobody handled.
    Fault(Fault),
    /// There is no work left.
    Completed,
}

impl ExitCause {
    /// Exit code used when neither the trigger nor the task chose one.
    pub fn default_code(&self) -> i32 {
        match self {
            ExitCause::Completed => 0,
            ExitCause::Signal(_) | ExitCause::Fault(_) => 1,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ExitCause::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, ExitCause::Fault(_))
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ExitCause::Signal(_) => "signal",
            ExitCause::Fault(_) => "fault",
            ExitCause::Completed => "completed",
        }
    }
}

impl fmt::Display for ExitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCause::Signal(name) => write!(f, "signal {name}"),
            ExitCause::Fault(fault) => write!(f, "fault: {fault}"),
            ExitCause::Completed => f.write_str("natural completion"),
        }
    }
}

#[derive(Debug)]
struct ExitRequest {
    cause: ExitCause,
    code: Option<i32>,
}

/// Cloneable handle used to raise exit causes.
#[derive(Debug, Clone)]
pub struct ExitTrigger {
    tx: mpsc::UnboundedSender<ExitRequest>,
}

impl ExitTrigger {
    /// Report a received signal. Returns false once the coordinator is gone.
    pub fn signal(&self, name: &'static str) -> bool {
        self.send(ExitCause::Signal(name), None)
    }

    /// Report an unhandled fault.
    pub fn fault(&self, fault: impl Into<Fault>) -> bool {
        self.send(ExitCause::Fault(fault.into()), None)
    }

    /// Report natural completion.
    pub fn complete(&self) -> bool {
        self.send(ExitCause::Completed, None)
    }

    /// Report natural completion with a preset exit code.
    pub fn complete_with(&self, code: i32) -> bool {
        self.send(ExitCause::Completed, Some(code))
    }

    fn send(&self, cause: ExitCause, code: Option<i32>) -> bool {
        self.tx.send(ExitRequest { cause, code }).is_ok()
    }
}

type ExitPredicate = Box<dyn Fn(&ExitCause) -> bool + Send + Sync>;

/// Single-shot exit funnel for one process.
pub struct ExitCoordinator {
    timeout: Duration,
    predicate: Option<ExitPredicate>,
    listen_signals: bool,
    tx: mpsc::UnboundedSender<ExitRequest>,
    rx: mpsc::UnboundedReceiver<ExitRequest>,
}

impl ExitCoordinator {
    /// Create a coordinator whose exit task is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            timeout,
            predicate: None,
            listen_signals: false,
            tx,
            rx,
        }
    }

    /// Restrict which signal and fault causes start the exit sequence.
    /// Natural completion always does.
    pub fn should_exit_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ExitCause) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Listen for SIGINT, SIGHUP and SIGUSR2 while running.
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.listen_signals = enabled;
        self
    }

    pub fn trigger(&self) -> ExitTrigger {
        ExitTrigger {
            tx: self.tx.clone(),
        }
    }

    /// Wait for the first qualifying cause, run `task` once, and return the
    /// resolved exit code.
    ///
    /// The task may return `Some(code)` to choose the code. Otherwise the code
    /// preset by the trigger is used, then 0 for natural completion and 1 for
    /// anything else. A task that panics or outlives the timeout yields 1.
    pub async fn run<F, Fut>(self, task: F) -> i32
    where
        F: FnOnce(ExitCause) -> Fut + Send,
        Fut: Future<Output = Option<i32>> + Send + 'static,
    {
        let Self {
            timeout,
            predicate,
            listen_signals,
            tx,
            mut rx,
        } = self;

        let signal_forwarder = if listen_signals {
            match SignalListener::new() {
                Ok(listener) => Some(listener.spawn_forwarder(ExitTrigger { tx: tx.clone() })),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install signal handlers");
                    None
                }
            }
        } else {
            None
        };
        drop(tx);

        let qualifies = |cause: &ExitCause| match cause {
            ExitCause::Completed => true,
            _ => predicate.as_ref().map_or(true, |p| p(cause)),
        };

        let request = loop {
            match rx.recv().await {
                Some(request) if qualifies(&request.cause) => break request,
                Some(request) => {
                    tracing::debug!(cause = %request.cause, "Exit cause filtered out");
                }
                None => {
                    tracing::debug!("No exit trigger left, treating as natural completion");
                    break ExitRequest {
                        cause: ExitCause::Completed,
                        code: None,
                    };
                }
            }
        };

        let ExitRequest { cause, code: preset } = request;
        tracing::info!(cause = %cause, "Exit sequence started");
        metrics::record_exit_cause(cause.label());

        // Freeze: any later cause is only logged.
        let drain = tokio::spawn(async move {
            while let Some(late) = rx.recv().await {
                tracing::warn!(cause = %late.cause, "Exit already in progress, discarding cause");
            }
        });

        let fallback = preset.unwrap_or_else(|| cause.default_code());
        let mut task = tokio::spawn(task(cause));

        let code = match race_deadline(timeout, &mut task).await {
            Ok(Ok(Some(code))) => code,
            Ok(Ok(None)) => fallback,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Exit task failed, forcing exit");
                1
            }
            Err(Elapsed) => {
                task.abort();
                tracing::error!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Exit task did not complete in time, forcing exit"
                );
                1
            }
        };

        drain.abort();
        let _ = drain.await;
        if let Some(forwarder) = signal_forwarder {
            forwarder.abort();
        }

        tracing::info!(code, "Exiting");
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    fn new_coordinator() -> ExitCoordinator {
        ExitCoordinator::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_completion_defaults_to_zero() {
        let coordinator = new_coordinator();
        coordinator.trigger().complete();
        assert_eq!(coordinator.run(|_| async { None }).await, 0);
    }

    #[tokio::test]
    async fn test_signal_and_fault_default_to_one() {
        let coordinator = new_coordinator();
        coordinator.trigger().signal("SIGINT");
        assert_eq!(coordinator.run(|_| async { None }).await, 1);

        let coordinator = new_coordinator();
        coordinator.trigger().fault(Fault::new("boom"));
        assert_eq!(coordinator.run(|_| async { None }).await, 1);
    }

    #[tokio::test]
    async fn test_preset_code_and_task_code() {
        let coordinator = new_coordinator();
        coordinator.trigger().complete_with(0);
        coordinator.trigger().fault(Fault::new("late"));
        assert_eq!(coordinator.run(|_| async { None }).await, 0);

        let coordinator = new_coordinator();
        coordinator.trigger().signal("SIGUSR2");
        assert_eq!(coordinator.run(|_| async { Some(42) }).await, 42);
    }

    #[tokio::test]
    async fn test_task_runs_once_for_first_cause() {
        let coordinator = new_coordinator();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut raisers = Vec::new();
        for i in 0..16 {
            let trigger = coordinator.trigger();
            raisers.push(tokio::spawn(async move {
                match i % 3 {
                    0 => trigger.signal("SIGHUP"),
                    1 => trigger.fault(Fault::new("concurrent")),
                    _ => trigger.complete(),
                }
            }));
        }

        let seen = runs.clone();
        let observed = Arc::new(AtomicI32::new(-1));
        let sink = observed.clone();
        let code = coordinator
            .run(move |cause| async move {
                seen.fetch_add(1, Ordering::SeqCst);
                sink.store(cause.default_code(), Ordering::SeqCst);
                None
            })
            .await;
        for raiser in raisers {
            raiser.await.unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        // The exit code comes from the same cause the task was given.
        assert_eq!(code, observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_first_cause_decides_code() {
        let coordinator = new_coordinator();
        let trigger = coordinator.trigger();
        trigger.complete();
        trigger.signal("SIGINT");
        trigger.fault(Fault::new("late"));

        let code = coordinator
            .run(|cause| async move {
                assert!(matches!(cause, ExitCause::Completed));
                None
            })
            .await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_hanging_task_is_cut_by_timeout() {
        let coordinator = ExitCoordinator::new(Duration::from_millis(50));
        coordinator.trigger().complete_with(0);

        let started = std::time::Instant::now();
        let code = coordinator
            .run(|_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Some(0)
            })
            .await;

        assert_eq!(code, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_panicking_task_forces_failure_code() {
        let coordinator = new_coordinator();
        coordinator.trigger().complete();
        let code = coordinator
            .run(|_| async {
                if true {
                    panic!("exit task blew up");
                }
                None
            })
            .await;
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_predicate_filters_signals_but_not_completion() {
        let coordinator =
            new_coordinator().should_exit_if(|cause| !matches!(cause, ExitCause::Signal(_)));
        let trigger = coordinator.trigger();
        trigger.signal("SIGINT");
        trigger.signal("SIGHUP");
        trigger.complete_with(3);

        let code = coordinator
            .run(|cause| async move {
                assert!(matches!(cause, ExitCause::Completed));
                None
            })
            .await;
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn test_dropped_triggers_mean_completion() {
        let coordinator = new_coordinator();
        let code = coordinator.run(|cause| async move { Some(cause.default_code()) }).await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_trigger_reports_closed_coordinator() {
        let coordinator = new_coordinator();
        let trigger = coordinator.trigger();
        trigger.complete();
        coordinator.run(|_| async { None }).await;
        assert!(!trigger.complete());
    }
}
