//! Supervisor states.
//!
//! # State Transitions
//! ```text
//! Starting → EvictingStale → Running ⇄ CrashBackoff → Terminating → Terminated
//!                               │            │
//!                               ├─ Halted ◀──┘ (auto-restart disabled)
//!                               └─ Fatal       (crash loop, hook fault, spawn failure)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting = 0,
    EvictingStale = 1,
    Running = 2,
    CrashBackoff = 3,
    Halted = 4,
    Terminating = 5,
    Terminated = 6,
    Fatal = 7,
}

impl From<u8> for SupervisorState {
    fn from(val: u8) -> Self {
        match val {
            1 => SupervisorState::EvictingStale,
            2 => SupervisorState::Running,
            3 => SupervisorState::CrashBackoff,
            4 => SupervisorState::Halted,
            5 => SupervisorState::Terminating,
            6 => SupervisorState::Terminated,
            7 => SupervisorState::Fatal,
            _ => SupervisorState::Starting,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Starting => "starting",
            SupervisorState::EvictingStale => "evicting_stale",
            SupervisorState::Running => "running",
            SupervisorState::CrashBackoff => "crash_backoff",
            SupervisorState::Halted => "halted",
            SupervisorState::Terminating => "terminating",
            SupervisorState::Terminated => "terminated",
            SupervisorState::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Shared, observable current state.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SupervisorState::Starting as u8)))
    }

    pub fn get(&self) -> SupervisorState {
        SupervisorState::from(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: SupervisorState) {
        let previous = SupervisorState::from(self.0.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Supervisor state changed");
        }
    }

    /// Move to `state` unless the supervisor already failed fatally.
    pub(crate) fn set_unless_fatal(&self, state: SupervisorState) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != SupervisorState::Fatal as u8).then_some(state as u8)
            });
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
