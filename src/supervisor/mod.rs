//! Process supervision subsystem.
//!
//! # Responsibilities
//! - Single-instance enforcement through the pid-file
//! - Fork the worker and restart it after crashes, within a restart budget
//! - Bounded graceful shutdown with SIGKILL escalation
//!
//! # State Transitions
//! ```text
//! Starting → EvictingStale → Running ⇄ CrashBackoff → Terminating → Terminated
//!                            Running → Halted (auto-restart disabled)
//!            Running | CrashBackoff → Fatal
//! ```
//!
//! # Timeouts
//! ```text
//! stop_timeout              coordinator deadline
//!   × 16/17                 termination handle race
//!   × 9/10                  stop message → SIGKILL escalation
//!   × 8/10                  worker's own exit sequence
//! ```

pub mod budget;
pub mod handle;
pub mod launcher;
pub mod runner;
pub mod state;
pub mod worker;

pub use budget::{CrashVerdict, RestartBudget};
pub use handle::{HandleSlot, TerminationHandle, WorkerExit};
pub use launcher::{CommandLauncher, SelfExecLauncher, WorkerLauncher};
pub use runner::{Supervisor, SupervisorHooks};
pub use state::{StateCell, SupervisorState};
