//! The supervisor process: pid-file owner and worker lifecycle manager.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use nix::unistd::Pid;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{BoxError, SupervisorError};
use crate::lifecycle::{ExitCause, ExitCoordinator, ExitTrigger, Fault, Shutdown, GRACEFUL_STOP};
use crate::liveness::{self, PidFile};
use crate::observability::metrics;
use crate::resilience::backoff;
use crate::resilience::timeouts::{race_deadline, Elapsed};
use crate::supervisor::budget::{CrashVerdict, RestartBudget};
use crate::supervisor::handle::{observed_exit, HandleSlot, TerminationHandle};
use crate::supervisor::launcher::WorkerLauncher;
use crate::supervisor::state::{StateCell, SupervisorState};
use crate::supervisor::worker::{WatchedWorker, WorkerProcess};

type PreForkHook = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Strategy hooks run by the supervisor.
#[derive(Clone, Default)]
pub struct SupervisorHooks {
    pre_fork: Option<PreForkHook>,
}

impl SupervisorHooks {
    /// Run `hook` before every worker fork. An error is fatal.
    pub fn pre_fork<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.pre_fork = Some(Arc::new(move || Box::pin(hook())));
        self
    }
}

/// Root process of a service.
pub struct Supervisor {
    config: Arc<ServiceConfig>,
    hooks: SupervisorHooks,
    launcher: Arc<dyn WorkerLauncher>,
    coordinator: ExitCoordinator,
    state: StateCell,
    instance_id: Uuid,
}

impl Supervisor {
    pub fn new(config: ServiceConfig, launcher: impl WorkerLauncher + 'static) -> Self {
        let coordinator = ExitCoordinator::new(config.stop_timeout()).with_os_signals(true);
        Self {
            config: Arc::new(config),
            hooks: SupervisorHooks::default(),
            launcher: Arc::new(launcher),
            coordinator,
            state: StateCell::new(),
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn with_hooks(mut self, hooks: SupervisorHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Listen for SIGINT, SIGHUP and SIGUSR2 (on by default).
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.coordinator = self.coordinator.with_os_signals(enabled);
        self
    }

    /// Trigger feeding the supervisor's exit coordinator.
    pub fn exit_trigger(&self) -> ExitTrigger {
        self.coordinator.trigger()
    }

    /// Observable state of this supervisor.
    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Run until the service terminates; returns the process exit code.
    pub async fn run(self) -> i32 {
        let span = tracing::info_span!(
            "supervisor",
            service = %self.config.name,
            instance = %self.instance_id
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> i32 {
        let Supervisor {
            config,
            hooks,
            launcher,
            coordinator,
            state,
            instance_id,
        } = self;

        let pid_file = PidFile::new(&config.pid_file);

        if liveness::is_running(&pid_file) {
            state.set(SupervisorState::EvictingStale);
            if let Err(e) = liveness::request_stop(&pid_file, GRACEFUL_STOP).await {
                tracing::error!(error = %e, "Failed to evict running instance");
                state.set(SupervisorState::Fatal);
                return 1;
            }
        }

        if let Err(e) = pid_file.claim(Pid::this()) {
            tracing::error!(error = %e, "Refusing to start");
            state.set(SupervisorState::Fatal);
            return 1;
        }
        tracing::info!(pid = Pid::this().as_raw(), path = ?pid_file.path(), "Pid file claimed");
        state.set(SupervisorState::Running);

        let shutdown = Shutdown::new();
        let slot = Arc::new(HandleSlot::default());
        let trigger = coordinator.trigger();

        let fork_loop = ForkLoop {
            config: config.clone(),
            hooks,
            launcher,
            slot: slot.clone(),
            shutdown: shutdown.clone(),
            trigger: trigger.clone(),
            state: state.clone(),
            instance_id,
        };
        let fork_task = tokio::spawn(fork_loop.run().in_current_span());
        let fork_abort = fork_task.abort_handle();
        tokio::spawn(async move {
            if let Err(e) = fork_task.await {
                if e.is_panic() {
                    trigger.fault(Fault::new(format!("fork loop panicked: {e}")));
                }
            }
        });

        let termination = Termination {
            slot,
            shutdown,
            pid_file,
            state: state.clone(),
            race: config.termination_timeout(),
        };
        let code = coordinator
            .run(move |cause| termination.run(cause).in_current_span())
            .await;

        fork_abort.abort();
        state.set_unless_fatal(SupervisorState::Terminated);
        code
    }
}

/// Exit task of the supervisor's coordinator.
struct Termination {
    slot: Arc<HandleSlot>,
    shutdown: Shutdown,
    pid_file: PidFile,
    state: StateCell,
    race: Duration,
}

impl Termination {
    async fn run(self, cause: ExitCause) -> Option<i32> {
        self.state.set_unless_fatal(SupervisorState::Terminating);
        self.shutdown.trigger();

        let child_code = match self.slot.current() {
            Some(handle) => match race_deadline(self.race, handle.terminate()).await {
                Ok(code) => Some(code),
                Err(Elapsed) => {
                    tracing::error!(
                        pid = ?handle.pid(),
                        timeout_ms = self.race.as_millis() as u64,
                        "Worker termination timed out"
                    );
                    Some(1)
                }
            },
            None => None,
        };

        let code = if cause.is_fault() {
            1
        } else {
            child_code.unwrap_or(0)
        };

        if let Err(e) = self.pid_file.remove() {
            tracing::error!(path = ?self.pid_file.path(), error = %e, "Failed to remove pid file");
        }

        tracing::info!(cause = %cause, code, "Supervisor terminated");
        Some(code)
    }
}

/// The RUNNING ⇄ CRASH_BACKOFF cycle.
struct ForkLoop {
    config: Arc<ServiceConfig>,
    hooks: SupervisorHooks,
    launcher: Arc<dyn WorkerLauncher>,
    slot: Arc<HandleSlot>,
    shutdown: Shutdown,
    trigger: ExitTrigger,
    state: StateCell,
    instance_id: Uuid,
}

impl ForkLoop {
    async fn run(self) {
        let mut budget = RestartBudget::new(
            self.config.max_consecutive_restart,
            self.config.stability_window(),
        );
        metrics::record_restart_budget(budget.remaining());

        loop {
            if let Err(e) = self.run_pre_fork().await {
                self.fatal(e);
                return;
            }

            if self.shutdown.is_triggered() {
                tracing::debug!("Shutdown requested, not forking");
                return;
            }

            let worker = match WorkerProcess::spawn(
                self.launcher.as_ref(),
                self.config.forward_stdout,
                self.instance_id,
            ) {
                Ok(worker) => worker,
                Err(e) => {
                    self.fatal(SupervisorError::Spawn(e));
                    return;
                }
            };
            tracing::info!(pid = worker.pid(), "Worker started");
            metrics::record_worker_spawn();

            let WatchedWorker {
                pid,
                started,
                handle,
                mut exit,
            } = worker.watch(self.config.escalation_timeout());

            let handle = Arc::new(handle);
            self.slot.install(handle.clone());
            if self.shutdown.is_triggered() {
                handle.request_stop();
            }

            let worker_exit = observed_exit(&mut exit).await;
            if self.shutdown.is_triggered() {
                // The termination path owns this exit.
                return;
            }
            self.slot.clear();
            metrics::record_worker_crash();

            let code = worker_exit.crash_code();
            let uptime = started.elapsed();

            let Some(base_delay) = self.config.restart_delay() else {
                tracing::warn!(pid, code, "Worker exited and auto-restart is disabled");
                self.state.set(SupervisorState::Halted);
                self.slot.install(Arc::new(TerminationHandle::exited(code)));
                self.trigger.complete();
                return;
            };

            match budget.record_crash(uptime) {
                CrashVerdict::Exhausted { crashes } => {
                    tracing::error!(
                        pid,
                        code,
                        crashes,
                        "Worker is crashing over and over, giving up"
                    );
                    self.fatal(SupervisorError::CrashLoop { crashes });
                    return;
                }
                CrashVerdict::Restart { consecutive } => {
                    metrics::record_restart_budget(budget.remaining());
                    let cap = self
                        .config
                        .max_restart_delay_ms
                        .map(Duration::from_millis);
                    let delay = backoff::restart_delay(base_delay, cap, consecutive);

                    tracing::warn!(
                        pid,
                        code,
                        uptime_ms = uptime.as_millis() as u64,
                        restart_in_ms = delay.as_millis() as u64,
                        remaining = budget.remaining(),
                        "Worker exited unexpectedly, restarting"
                    );

                    self.state.set(SupervisorState::CrashBackoff);
                    if !self.backoff(delay).await {
                        return;
                    }
                    self.state.set(SupervisorState::Running);
                }
            }
        }
    }

    /// Sleep before the next fork; false if shutdown arrived meanwhile.
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.wait() => false,
        }
    }

    async fn run_pre_fork(&self) -> Result<(), SupervisorError> {
        let Some(hook) = &self.hooks.pre_fork else {
            return Ok(());
        };

        // Spawned so a panicking hook is reported instead of unwinding the loop.
        match tokio::spawn(hook()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SupervisorError::PreForkHook(e)),
            Err(e) => Err(SupervisorError::PreForkHook(Box::new(e))),
        }
    }

    fn fatal(&self, error: SupervisorError) {
        tracing::error!(error = %error, "Supervisor failed");
        self.state.set(SupervisorState::Fatal);
        self.trigger.fault(error);
    }
}
