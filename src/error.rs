//! Error types shared by the supervisor and worker roles.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error used for user-supplied hooks and service entry points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the supervision engine.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The pid-file was still present after evicting the previous instance,
    /// or it no longer holds our pid right after we wrote it.
    #[error("other instance launched simultaneously (pid file {path:?})")]
    ConcurrentInstance { path: PathBuf },

    /// The worker exhausted its restart budget.
    #[error("worker is crashing over and over ({crashes} consecutive crashes), giving up")]
    CrashLoop { crashes: u32 },

    /// The pre-fork hook returned an error or panicked.
    #[error("pre-fork hook failed: {0}")]
    PreForkHook(BoxError),

    /// The worker process could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reading, writing or removing the pid-file failed.
    #[error("pid file {path:?}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Delivering a signal to another process failed.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },
}

impl SupervisorError {
    pub(crate) fn pid_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PidFile {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;
