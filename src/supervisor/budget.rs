//! Restart budget: how many rapid consecutive crashes are tolerated.

use std::time::Duration;

/// Outcome of recording a worker crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashVerdict {
    /// Restart the worker. `consecutive` counts crashes since the last reset.
    Restart { consecutive: u32 },
    /// The budget is spent.
    Exhausted { crashes: u32 },
}

#[derive(Debug, Clone)]
pub struct RestartBudget {
    initial: u32,
    remaining: u32,
    consecutive: u32,
    stability_window: Duration,
}

impl RestartBudget {
    pub fn new(initial: u32, stability_window: Duration) -> Self {
        Self {
            initial,
            remaining: initial,
            consecutive: 0,
            stability_window,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset(&mut self) {
        self.remaining = self.initial;
        self.consecutive = 0;
    }

    /// Record a crash of a worker that ran for `uptime`.
    ///
    /// A worker that outlived the stability window refills the budget before
    /// its crash is counted.
    pub fn record_crash(&mut self, uptime: Duration) -> CrashVerdict {
        if uptime >= self.stability_window {
            self.reset();
        }

        self.consecutive += 1;
        if self.remaining == 0 {
            return CrashVerdict::Exhausted {
                crashes: self.consecutive,
            };
        }

        self.remaining -= 1;
        CrashVerdict::Restart {
            consecutive: self.consecutive,
        }
    }
}
