//! Restart delay with optional exponential growth and jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is 1-based; attempt 0 means no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Delay before the next worker fork.
///
/// Without a cap the configured delay is used as-is; with a cap it doubles per
/// consecutive crash.
pub fn restart_delay(base: Duration, cap: Option<Duration>, consecutive_crashes: u32) -> Duration {
    match cap {
        None => base,
        Some(cap) => calculate_backoff(
            consecutive_crashes.max(1),
            base.as_millis() as u64,
            cap.as_millis() as u64,
        ),
    }
}
