//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc by the supervisor and worker roles
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the worker re-reads the same file
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Hooks are code, not data: they travel through `SupervisorHooks`/`WorkerHooks`

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::LogFormat;
pub use schema::LoggingConfig;
pub use schema::MetricsConfig;
pub use schema::ServiceConfig;
pub use schema::UnitConfig;
