//! Control channel between supervisor and worker.
//!
//! The worker's stdin is the channel. The supervisor writes one line,
//! `stop`, to request a graceful stop; EOF means the supervisor is gone.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// Sentinel line asking the worker to stop.
pub const STOP_MESSAGE: &str = "stop";

/// Events read from the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Stop,
    Disconnected,
}

/// Reader side of the control channel.
pub struct ControlChannel<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> ControlChannel<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next meaningful event; unknown lines are skipped.
    pub async fn next_event(&mut self) -> ControlEvent {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim() == STOP_MESSAGE => return ControlEvent::Stop,
                Ok(Some(line)) => {
                    tracing::warn!(message = %line, "Ignoring unknown control message");
                }
                Ok(None) => return ControlEvent::Disconnected,
                Err(e) => {
                    tracing::debug!(error = %e, "Control channel read failed");
                    return ControlEvent::Disconnected;
                }
            }
        }
    }
}
