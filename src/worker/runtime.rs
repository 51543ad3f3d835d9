//! The worker side of a supervised service.
//!
//! # Responsibilities
//! - Run the service entry point under the worker's own exit coordinator
//! - Turn the supervisor's stop message into natural completion (code 0)
//! - Exit with 1 right away when the control channel disconnects
//! - Run the pre-exit hook, bounded by the coordinator timeout
//!
//! # Design Decisions
//! - Raw signals are filtered out: the process group receives the operator's
//!   signals too, and only the supervisor decides when the worker stops
//! - Disconnect bypasses the coordinator so no hook can delay it
//! - The entry point is dropped before `run` returns, so whatever it owns
//!   (a child started with `kill_on_drop`) is released before the process
//!   exits

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::oneshot;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::BoxError;
use crate::lifecycle::{ExitCause, ExitCoordinator, ExitTrigger, Fault, Shutdown};
use crate::supervisor::launcher::INSTANCE_ENV;
use crate::worker::channel::{ControlChannel, ControlEvent};

/// How long to wait for the aborted entry point to be dropped.
const ENTRY_DROP_GRACE: Duration = Duration::from_secs(1);

type PreExitHook =
    Arc<dyn Fn(Option<Fault>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Strategy hooks run by the worker.
#[derive(Clone, Default)]
pub struct WorkerHooks {
    pre_exit: Option<PreExitHook>,
}

impl WorkerHooks {
    /// Run `hook` once the worker starts exiting. It receives the fault, if
    /// the exit was caused by one.
    pub fn pre_exit<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Option<Fault>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.pre_exit = Some(Arc::new(move |fault| Box::pin(hook(fault))));
        self
    }
}

/// What the service entry point gets to see.
#[derive(Clone)]
pub struct WorkerContext {
    /// Triggered when the worker starts exiting.
    pub shutdown: Shutdown,
    /// Instance id of the supervisor that launched this worker.
    pub instance_id: Option<Uuid>,
}

type ControlReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Runtime of the worker process.
pub struct WorkerRuntime {
    hooks: WorkerHooks,
    exit_timeout: Duration,
    control: ControlReader,
    listen_signals: bool,
}

impl WorkerRuntime {
    /// Runtime reading control messages from stdin.
    pub fn new(config: &ServiceConfig, hooks: WorkerHooks) -> Self {
        Self {
            hooks,
            exit_timeout: config.worker_exit_timeout(),
            control: Box::new(BufReader::new(tokio::io::stdin())),
            listen_signals: true,
        }
    }

    /// Read control messages from `reader` instead of stdin.
    pub fn with_control<R>(mut self, reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        self.control = Box::new(reader);
        self
    }

    /// Install signal listeners. Received signals are filtered out either
    /// way, but listening keeps them from killing the process.
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.listen_signals = enabled;
        self
    }

    /// Run `entry` until the worker exits; returns the process exit code.
    pub async fn run<F, Fut>(self, entry: F) -> i32
    where
        F: FnOnce(WorkerContext) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let instance_id = std::env::var(INSTANCE_ENV)
            .ok()
            .and_then(|id| Uuid::parse_str(&id).ok());
        let span = tracing::info_span!(
            "worker",
            pid = std::process::id(),
            instance = ?instance_id
        );
        self.run_inner(entry, instance_id).instrument(span).await
    }

    async fn run_inner<F, Fut>(self, entry: F, instance_id: Option<Uuid>) -> i32
    where
        F: FnOnce(WorkerContext) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let WorkerRuntime {
            hooks,
            exit_timeout,
            control,
            listen_signals,
        } = self;

        let coordinator = ExitCoordinator::new(exit_timeout)
            .should_exit_if(|cause| !matches!(cause, ExitCause::Signal(_)))
            .with_os_signals(listen_signals);
        let trigger = coordinator.trigger();
        let shutdown = Shutdown::new();

        let (disconnect_tx, disconnect_rx) = oneshot::channel();
        let control_task = tokio::spawn(
            watch_control(
                ControlChannel::new(control),
                trigger.clone(),
                shutdown.clone(),
                disconnect_tx,
            )
            .in_current_span(),
        );

        let context = WorkerContext {
            shutdown: shutdown.clone(),
            instance_id,
        };
        let entry_task = tokio::spawn(entry(context));
        let entry_abort = entry_task.abort_handle();
        let entry_trigger = trigger.clone();
        let entry_watch = tokio::spawn(
            async move {
                match entry_task.await {
                    Ok(Ok(())) => {
                        tracing::info!("Service entry point finished");
                        entry_trigger.complete();
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Service entry point failed");
                        entry_trigger.fault(Fault::new(e));
                    }
                    Err(e) if e.is_panic() => {
                        tracing::error!(error = %e, "Service entry point panicked");
                        entry_trigger.fault(Fault::new(e));
                    }
                    Err(_) => {}
                }
            }
            .in_current_span(),
        );
        drop(trigger);

        let exit_shutdown = shutdown.clone();
        let exit_task = move |cause: ExitCause| {
            exit_shutdown.trigger();
            run_pre_exit(hooks, cause).in_current_span()
        };

        let code = tokio::select! {
            code = coordinator.run(exit_task) => code,
            Ok(()) = disconnect_rx => {
                tracing::error!("Supervisor is gone, exiting immediately");
                1
            }
        };

        shutdown.trigger();
        control_task.abort();
        entry_abort.abort();
        // The watcher finishes only after the entry future has been dropped.
        if tokio::time::timeout(ENTRY_DROP_GRACE, entry_watch).await.is_err() {
            tracing::warn!("Service entry point did not stop in time");
        }
        code
    }
}

async fn watch_control<R>(
    mut channel: ControlChannel<R>,
    trigger: ExitTrigger,
    shutdown: Shutdown,
    disconnect: oneshot::Sender<()>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match channel.next_event().await {
            ControlEvent::Stop => {
                tracing::info!("Stop requested by supervisor");
                shutdown.trigger();
                trigger.complete_with(0);
            }
            ControlEvent::Disconnected => {
                let _ = disconnect.send(());
                return;
            }
        }
    }
}

async fn run_pre_exit(hooks: WorkerHooks, cause: ExitCause) -> Option<i32> {
    let hook = hooks.pre_exit?;
    let fault = cause.fault().cloned();

    match tokio::spawn(hook(fault)).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Pre-exit hook failed");
            Some(1)
        }
        Err(e) => {
            tracing::error!(error = %e, "Pre-exit hook panicked");
            Some(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::AsyncWriteExt;

    fn runtime<R>(reader: R, hooks: WorkerHooks) -> WorkerRuntime
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let config = ServiceConfig {
            stop_timeout_ms: 2_000,
            ..ServiceConfig::default()
        };
        WorkerRuntime::new(&config, hooks)
            .with_control(reader)
            .with_os_signals(false)
    }

    #[tokio::test]
    async fn test_entry_completion_exits_zero() {
        let (_tx, rx) = tokio::io::duplex(64);
        let code = runtime(BufReader::new(rx), WorkerHooks::default())
            .run(|_| async { Ok::<(), BoxError>(()) })
            .await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_stop_message_runs_hook_and_exits_zero() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let hook_ran = Arc::new(AtomicBool::new(false));
        let flag = hook_ran.clone();
        let hooks = WorkerHooks::default().pre_exit(move |fault| {
            let flag = flag.clone();
            async move {
                assert!(fault.is_none());
                flag.store(true, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });

        tx.write_all(b"stop\n").await.unwrap();
        let code = runtime(BufReader::new(rx), hooks)
            .run(|ctx| async move {
                ctx.shutdown.wait().await;
                Ok::<(), BoxError>(())
            })
            .await;

        assert_eq!(code, 0);
        assert!(hook_ran.load(Ordering::SeqCst));
        drop(tx);
    }

    #[tokio::test]
    async fn test_disconnect_exits_one_without_hook() {
        let (tx, rx) = tokio::io::duplex(64);
        let hook_ran = Arc::new(AtomicBool::new(false));
        let flag = hook_ran.clone();
        let hooks = WorkerHooks::default().pre_exit(move |_| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });

        drop(tx);
        let code = runtime(BufReader::new(rx), hooks)
            .run(|_| std::future::pending::<Result<(), BoxError>>())
            .await;

        assert_eq!(code, 1);
        assert!(!hook_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_entry_error_passes_fault_to_hook() {
        let (_tx, rx) = tokio::io::duplex(64);
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        let hooks = WorkerHooks::default().pre_exit(move |fault| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = fault.map(|f| f.to_string());
                Ok::<(), BoxError>(())
            }
        });

        let code = runtime(BufReader::new(rx), hooks)
            .run(|_| async { Err::<(), BoxError>("database unreachable".into()) })
            .await;

        assert_eq!(code, 1);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("database unreachable"));
    }

    #[tokio::test]
    async fn test_failing_hook_exits_one() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let hooks = WorkerHooks::default()
            .pre_exit(|_| async { Err::<(), BoxError>("flush failed".into()) });

        tx.write_all(b"stop\n").await.unwrap();
        let code = runtime(BufReader::new(rx), hooks)
            .run(|_| std::future::pending::<Result<(), BoxError>>())
            .await;

        assert_eq!(code, 1);
        drop(tx);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_disconnect_drops_entry_before_returning() {
        let (tx, rx) = tokio::io::duplex(64);
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());

        drop(tx);
        let code = runtime(BufReader::new(rx), WorkerHooks::default())
            .run(move |_| async move {
                let _guard = guard;
                std::future::pending::<Result<(), BoxError>>().await
            })
            .await;

        assert_eq!(code, 1);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_hanging_hook_is_cut_by_exit_timeout() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let hooks = WorkerHooks::default()
            .pre_exit(|_| std::future::pending::<Result<(), BoxError>>());
        // 8/10 of the 2s stop timeout.
        let exit_timeout = Duration::from_millis(1_600);

        tx.write_all(b"stop\n").await.unwrap();
        let started = std::time::Instant::now();
        let code = runtime(BufReader::new(rx), hooks)
            .run(move |_| async move {
                let _guard = guard;
                std::future::pending::<Result<(), BoxError>>().await
            })
            .await;
        let elapsed = started.elapsed();

        assert_eq!(code, 1);
        assert!(elapsed >= exit_timeout - Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2_000), "{elapsed:?}");
        assert!(dropped.load(Ordering::SeqCst));
        drop(tx);
    }
}
