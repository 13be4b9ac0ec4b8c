//! Boot sequence for auto-start instances.
//!
//! # Data Flow
//! ```text
//! InstanceStore::list_auto_start_instances
//!     → DependencyManager::compute_startup_order
//!     → for each layer, in order:
//!           one task per instance → InstanceStarter::start_instance
//!           (per-instance timeout, shared layer cancellation token)
//!     → BootSequence* events, BootSummary or BootError::Failed
//! ```
//!
//! # Design Decisions
//! - Fail fast within a layer: the first failure cancels in-flight siblings
//! - Siblings that already started stay running; nothing is rolled back
//! - A failed layer ends the sequence; later layers are never attempted
//! - Isolation is the starter's concern (see `VerifyingStarter`)

pub mod sequence;
pub mod starter;

use thiserror::Error;

use crate::dependencies::DependencyError;
use crate::model::{join_ids, InstanceId};
use crate::store::StoreError;

pub use sequence::{BootSequenceManager, BootSummary};
pub use starter::{DryRunStarter, InstanceStarter, StartError, VerifyingStarter};

#[derive(Debug, Error)]
pub enum BootError {
    #[error("failed to load auto-start instances: {0}")]
    Store(#[from] StoreError),

    #[error("failed to compute startup order: {0}")]
    Plan(#[from] DependencyError),

    #[error("boot sequence failed for instances: {}", join_ids(.failed, ", "))]
    Failed {
        failed: Vec<InstanceId>,
        started: Vec<InstanceId>,
    },
}
