//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Worker crash:
//!     → supervisor::budget (is the crash within budget?)
//!     → backoff.rs (how long to wait before the next fork)
//!
//! Shutdown:
//!     → timeouts.rs (bound every await with a fraction of stop_timeout)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every shutdown await has a deadline
//! - Deadline wins ties so bounds are deterministic
//! - Jittered backoff avoids restart storms when enabled

pub mod backoff;
pub mod timeouts;
