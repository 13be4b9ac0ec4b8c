//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → OrchestratorConfig (validated, immutable)
//!     → copied section-by-section into each component's own config struct
//! ```
//!
//! # Design Decisions
//! - Every section has defaults so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - Tunables only; the entity inventory lives in the store

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BootConfig, IsolationConfig, LogFormat, ObservabilityConfig, OrchestratorConfig,
    ScheduleConfig,
};
