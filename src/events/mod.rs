//! Domain events.
//!
//! # Data Flow
//! ```text
//! IsolationVerifier ─┐
//! BootSequenceManager├──▶ Publisher (source tag, best-effort) ──▶ dyn EventBus
//! ScheduleEvaluator ─┤                                             ├─ BroadcastEventBus
//! DependencyManager ─┘                                             └─ MemoryEventBus
//! ```
//!
//! # Design Decisions
//! - Closed set of typed variants; each carries only its own fields
//! - Publishing never fails the caller; errors are logged by `Publisher`

pub mod bus;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use bus::{BroadcastEventBus, MemoryEventBus, Publisher};
pub use types::{
    ActionTaken, Event, EventEnvelope, IsolationViolationEvent, ViolationSeverity, ViolationType,
};

/// Errors raised by an event bus backend.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event bus closed")]
    Closed,

    #[error("event bus error: {0}")]
    Backend(String),
}

/// Sink for domain events.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), EventError>;
}
