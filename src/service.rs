//! Entry point for programs that turn themselves into a supervised service.
//!
//! The same binary runs twice: once as the supervisor, which re-executes
//! itself, and once as the worker, which runs the service logic. The role
//! is carried by the `SERVICE_SUPERVISOR_ROLE` environment variable.

use std::future::Future;

use crate::config::ServiceConfig;
use crate::error::BoxError;
use crate::supervisor::launcher::{ROLE_ENV, WORKER_ROLE};
use crate::supervisor::{SelfExecLauncher, Supervisor, SupervisorHooks};
use crate::worker::{WorkerContext, WorkerHooks, WorkerRuntime};

/// Which side of the service this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Supervisor,
    Worker,
}

impl Role {
    pub fn current() -> Self {
        Self::from_env_value(std::env::var(ROLE_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(WORKER_ROLE) => Role::Worker,
            _ => Role::Supervisor,
        }
    }
}

/// A service: configuration plus the hooks of both roles.
pub struct Service {
    config: ServiceConfig,
    supervisor_hooks: SupervisorHooks,
    worker_hooks: WorkerHooks,
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            supervisor_hooks: SupervisorHooks::default(),
            worker_hooks: WorkerHooks::default(),
        }
    }

    pub fn supervisor_hooks(mut self, hooks: SupervisorHooks) -> Self {
        self.supervisor_hooks = hooks;
        self
    }

    pub fn worker_hooks(mut self, hooks: WorkerHooks) -> Self {
        self.worker_hooks = hooks;
        self
    }

    /// Run the role of this process. In the worker role `entry` is the
    /// service logic; the supervisor never calls it.
    ///
    /// Returns the code the process should exit with.
    pub async fn run<F, Fut>(self, entry: F) -> i32
    where
        F: FnOnce(WorkerContext) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        match Role::current() {
            Role::Supervisor => {
                Supervisor::new(self.config, SelfExecLauncher)
                    .with_hooks(self.supervisor_hooks)
                    .run()
                    .await
            }
            Role::Worker => {
                WorkerRuntime::new(&self.config, self.worker_hooks)
                    .run(entry)
                    .await
            }
        }
    }
}
