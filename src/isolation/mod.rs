//! Pre-start isolation verification.
//!
//! # Data Flow
//! ```text
//! ServiceInstance
//!     → Layer 1 IP binding     adapter.rs → binding.rs (config file, wildcard rejection)
//!                              or direct bind_ip check when no adapter is wired
//!     → Layer 2 directory      filesystem.rs (containment, 0750 permissions)
//!     → Layer 3 ports          PortRegistry (queried fresh every call)
//!     → Layer 4 process bind   probe.rs (advisory, warning only)
//!     → IsolationReport (report.rs)
//!     → IsolationViolation events for every Layer 1-3 error
//! ```
//!
//! # Design Decisions
//! - Findings are `Violation` values, not errors; the caller reads `passed`
//! - No layer short-circuits another, so one pass surfaces every problem

pub mod adapter;
pub mod binding;
pub mod filesystem;
pub mod probe;
pub mod report;
pub mod verifier;

pub use adapter::{ConfigBindingValidatorPort, ConfigValidatorAdapter};
pub use binding::{BindingError, ConfigBindingValidator, ServiceType};
pub use probe::{detect_listener_probe, ListenerProbe, NoopListenerProbe, ProcNetListenerProbe};
pub use report::{IsolationLayer, IsolationReport, Severity, Violation};
pub use verifier::{
    IsolationError, IsolationVerifier, IsolationVerifierBuilder, PortRegistry, PortRegistryError,
};
