//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor and worker produce:
//!     → logging.rs (structured log events, stderr)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → journald / log aggregation
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Instance ID flows from supervisor to worker through the environment
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
