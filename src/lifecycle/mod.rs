//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Seed store → Wire verifier, dependencies, boot, evaluator
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → cancel in-flight boot layer → stop schedule evaluator → exit
//! ```
//!
//! # Design Decisions
//! - Every collaborator is built in one place and passed down explicitly
//! - Shutdown waits for the in-flight schedule tick to finish

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
pub use startup::{Orchestrator, StartupError};
