//! Deadline races.
//!
//! Every suspension point in the shutdown path is bounded by one of the
//! fractions of the configured stop timeout:
//! ```text
//! stop_timeout            supervisor coordinator (process exit)
//!   16/17                 termination handle race
//!    9/10                 SIGKILL escalation of the worker
//!    8/10                 worker coordinator (pre-exit hook)
//! ```

use std::future::Future;
use std::time::Duration;

/// The deadline fired before the future resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

/// `duration * num / den`, computed on milliseconds.
pub fn fraction_of(duration: Duration, num: u32, den: u32) -> Duration {
    let millis = duration.as_millis() * u128::from(num) / u128::from(den);
    Duration::from_millis(millis as u64)
}

/// First of {result, deadline}.
///
/// The deadline is polled first, so it wins when both are ready.
pub async fn race_deadline<F: Future>(deadline: Duration, future: F) -> Result<F::Output, Elapsed> {
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);
    tokio::pin!(future);

    tokio::select! {
        biased;
        _ = &mut sleep => Err(Elapsed),
        output = &mut future => Ok(output),
    }
}
