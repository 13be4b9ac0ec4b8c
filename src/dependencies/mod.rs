//! Service dependency graph.
//!
//! # Data Flow
//! ```text
//! InstanceStore (declared edges)
//!     → manager.rs (edges restricted to the requested set)
//!     → graph.rs (layered Kahn sort)
//!     → [[layer 0], [layer 1], ...] consumed by the boot sequence
//! ```
//!
//! # Design Decisions
//! - Instances inside a layer are independent and may start concurrently
//! - A cycle is fatal; no partial ordering is ever returned
//! - Layers are sorted so repeated runs produce the same plan

pub mod graph;
pub mod manager;

use thiserror::Error;

use crate::model::{join_ids, InstanceId};
use crate::store::StoreError;

pub use graph::layered_order;
pub use manager::{DependencyGraph, DependencyManager, GraphNode, NewDependency};

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("dependency cycle among instances: {}", join_ids(.unresolved, ", "))]
    Cycle { unresolved: Vec<InstanceId> },

    #[error("adding dependency would create a cycle: {}", join_ids(.path, " -> "))]
    WouldCycle { path: Vec<InstanceId> },

    #[error("instance {0} cannot depend on itself")]
    SelfDependency(InstanceId),

    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("dependency {from} -> {to} already exists")]
    Duplicate { from: InstanceId, to: InstanceId },

    #[error(transparent)]
    Store(#[from] StoreError),
}
