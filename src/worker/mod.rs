//! Worker process subsystem.
//!
//! # Data Flow
//! ```text
//! stdin ──► ControlChannel ──► "stop"  → natural completion (code 0) → pre-exit hook
//!                         └──► EOF     → exit 1, no hook
//! entry point ──► Ok → natural completion | Err/panic → fault → pre-exit hook
//! ```

pub mod channel;
pub mod runtime;

pub use channel::{ControlChannel, ControlEvent, STOP_MESSAGE};
pub use runtime::{WorkerContext, WorkerHooks, WorkerRuntime};
