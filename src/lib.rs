//! Process supervision engine.
//!
//! Turns a long-running task into a resilient service: one instance per
//! pid-file, a thin supervisor that restarts a worker process after crashes,
//! and bounded graceful shutdown on signals, faults and natural completion.

// Core subsystems
pub mod config;
pub mod lifecycle;
pub mod liveness;
pub mod supervisor;
pub mod worker;

// Cross-cutting concerns
pub mod error;
pub mod observability;
pub mod resilience;

// Entry points
pub mod command;
pub mod service;
pub mod unit;

pub use config::ServiceConfig;
pub use error::{BoxError, SupervisorError};
pub use lifecycle::{ExitCause, ExitCoordinator, ExitTrigger, Fault, Shutdown};
pub use service::{Role, Service};
pub use supervisor::{Supervisor, SupervisorHooks};
pub use worker::{WorkerContext, WorkerHooks, WorkerRuntime};
