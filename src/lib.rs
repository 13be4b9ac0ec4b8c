//! Service orchestration core for a network appliance.
//!
//! Decides when and in what order downloadable network services (Tor,
//! sing-box, xray-core, mtproxy, AdGuard Home, Psiphon) may start, gates each
//! start behind a four-layer isolation check, and keeps routing rules in line
//! with their weekly time-window schedules.

// Ambient
pub mod config;
pub mod events;
pub mod model;
pub mod store;

// Orchestration
pub mod boot;
pub mod dependencies;
pub mod isolation;
pub mod scheduling;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use boot::BootSequenceManager;
pub use config::OrchestratorConfig;
pub use dependencies::DependencyManager;
pub use isolation::IsolationVerifier;
pub use lifecycle::Shutdown;
pub use scheduling::ScheduleEvaluator;
