//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGHUP and SIGUSR2
//! - Translate each delivery into an `ExitCause::Signal`
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGUSR2 is the graceful-stop signal shared by `svcctl stop` and eviction
//! - Installing a handler replaces the default action, so a process that
//!   filters signals out keeps running when its process group is signalled

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, Signal as SignalStream, SignalKind};
use tokio::task::JoinHandle;

use crate::lifecycle::exit::ExitTrigger;

/// Signal used to request a cooperative stop.
pub const GRACEFUL_STOP: Signal = Signal::SIGUSR2;

/// Listener for the recognised termination signals.
pub struct SignalListener {
    sigint: SignalStream,
    sighup: SignalStream,
    sigusr2: SignalStream,
}

impl SignalListener {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sighup: signal(SignalKind::hangup())?,
            sigusr2: signal(SignalKind::user_defined2())?,
        })
    }

    /// Wait for the next signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sighup.recv() => "SIGHUP",
            _ = self.sigusr2.recv() => "SIGUSR2",
        }
    }

    /// Spawn a task that forwards every signal to the exit coordinator.
    pub fn spawn_forwarder(mut self, trigger: ExitTrigger) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let name = self.recv().await;
                tracing::info!(signal = name, "Received signal");
                if !trigger.signal(name) {
                    break;
                }
            }
        })
    }
}
