//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Exit (exit.rs):
//!     Signal | fault | completion → first cause wins → exit task → exit code
//!
//! Shutdown (shutdown.rs):
//!     Exit task starts → latch triggered → loops stop scheduling new work
//!
//! Signals (signals.rs):
//!     SIGINT/SIGHUP/SIGUSR2 → ExitCause::Signal
//! ```
//!
//! # Design Decisions
//! - One coordinator per process, reused by supervisor and worker
//! - Exit has timeout: forced exit after deadline

pub mod exit;
pub mod shutdown;
pub mod signals;

pub use exit::{ExitCause, ExitCoordinator, ExitTrigger, Fault};
pub use shutdown::Shutdown;
pub use signals::GRACEFUL_STOP;
