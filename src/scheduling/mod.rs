//! Time-window activation of device routings.
//!
//! # Data Flow
//! ```text
//! Start() ──▶ tick now, then every interval until Stop()
//! Evaluate() ──▶ tick on demand (only while running)
//!
//! tick:
//!     clock.rs (router time, system fallback, skew warning)
//!     → RoutingStore::list_enabled_schedules
//!     → group by routing_id
//!     → per routing: window.rs over its schedules (OR)
//!         Inactive → Active: set active, stamp last_activated, ScheduleActivated
//!         Active → Inactive: set inactive, stamp last_deactivated, ScheduleDeactivated
//!         unchanged: no-op
//! ```
//!
//! # Design Decisions
//! - Edge-triggered and idempotent; every tick re-establishes the invariant
//!   `routing.active == any enabled schedule window is open`
//! - A routing that fails to load is skipped for that tick only
//! - Every tick re-reads all enabled schedules; no incremental index

pub mod clock;
pub mod evaluator;
pub mod killswitch;
pub mod validation;
pub mod window;

use thiserror::Error;

use crate::store::StoreError;

pub use clock::{ManualClock, RouterClockProvider};
pub use evaluator::ScheduleEvaluator;
pub use killswitch::{KillSwitchCoordinator, KillSwitchError};
pub use validation::{validate_schedule, validate_schedule_input, ScheduleInput};
pub use window::is_window_active;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule evaluator is already running")]
    AlreadyRunning,

    #[error("schedule evaluator is not running")]
    NotRunning,

    #[error("routing id is required")]
    MissingRoutingId,

    #[error("schedule must include at least one day")]
    NoDays,

    #[error("invalid day {0}: days must be 0 (Sunday) to 6 (Saturday)")]
    InvalidDay(u8),

    #[error("duplicate day {0}")]
    DuplicateDay(u8),

    #[error("{field} must be HH:MM (24-hour), got {value:?}")]
    InvalidTime { field: &'static str, value: String },

    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
