//! How a worker process is started.

use std::ffi::OsString;
use std::io;

use tokio::process::Command;

/// Environment variable marking a process as the worker role.
pub const ROLE_ENV: &str = "SERVICE_SUPERVISOR_ROLE";

/// Environment variable carrying the supervisor's instance id.
pub const INSTANCE_ENV: &str = "SERVICE_SUPERVISOR_INSTANCE";

pub const WORKER_ROLE: &str = "worker";

/// Builds the command for a new worker process.
///
/// The supervisor configures stdio and the instance id on top of it.
pub trait WorkerLauncher: Send + Sync {
    fn command(&self) -> io::Result<Command>;
}

/// Re-executes the current binary with the same arguments in the worker role.
#[derive(Debug, Clone, Default)]
pub struct SelfExecLauncher;

impl WorkerLauncher for SelfExecLauncher {
    fn command(&self) -> io::Result<Command> {
        let exe = std::env::current_exe()?;
        let mut command = Command::new(exe);
        command
            .args(std::env::args_os().skip(1))
            .env(ROLE_ENV, WORKER_ROLE);
        Ok(command)
    }
}

/// Runs an arbitrary program that speaks the stdin control protocol.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandLauncher {
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl WorkerLauncher for CommandLauncher {
    fn command(&self) -> io::Result<Command> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        Ok(command)
    }
}
