//! Liveness subsystem: single-instance enforcement through a pid-file.
//!
//! # Data Flow
//! ```text
//! pid_file.rs: PidFile ── read ──▶ prober.rs: kill(pid, 0)
//!                                    ├─ alive → running
//!                                    └─ gone  → delete pid-file → not running
//! ```

pub mod pid_file;
pub mod prober;

pub use pid_file::PidFile;
pub use prober::{is_alive, is_running, request_stop, running_pid};
