//! Persistence boundary.
//!
//! # Data Flow
//! ```text
//! inventory.json ──▶ inventory.rs ──▶ MemoryStore (memory.rs)
//!                                        │
//!         ┌──────────────────────────────┼───────────────────────────┐
//!         ▼                              ▼                           ▼
//!   InstanceStore                  RoutingStore                PortRegistry
//!   (dependencies, boot)           (scheduling)                (isolation layer 3)
//! ```
//!
//! # Design Decisions
//! - Components depend on the narrow traits, never on a storage engine
//! - Every read goes to the store; nothing above this layer caches entities
//! - Readers on different control loops do not coordinate; each works from
//!   the snapshot it read

pub mod inventory;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{DeviceRouting, InstanceId, RoutingSchedule, ServiceDependency, ServiceInstance};

pub use inventory::Inventory;
pub use memory::MemoryStore;

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid {entity} {id}: {reason}")]
    Invalid {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Service instances and their declared dependencies.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(&self, id: &InstanceId) -> StoreResult<ServiceInstance>;

    async fn instance_exists(&self, id: &InstanceId) -> StoreResult<bool>;

    /// Instances flagged `auto_start = true`.
    async fn list_auto_start_instances(&self) -> StoreResult<Vec<ServiceInstance>>;

    async fn list_instances_by_router(&self, router_id: &str) -> StoreResult<Vec<ServiceInstance>>;

    async fn get_dependency(&self, id: &str) -> StoreResult<ServiceDependency>;

    /// Dependencies declared by any of `ids` (edges leaving the set members).
    async fn list_dependencies_from(&self, ids: &[InstanceId]) -> StoreResult<Vec<ServiceDependency>>;

    /// Dependencies pointing at `id` (its dependents).
    async fn list_dependencies_to(&self, id: &InstanceId) -> StoreResult<Vec<ServiceDependency>>;

    async fn insert_dependency(&self, dependency: ServiceDependency) -> StoreResult<()>;

    async fn delete_dependency(&self, id: &str) -> StoreResult<ServiceDependency>;

    /// Remove every edge touching `id`; returns (outgoing, incoming) counts.
    async fn delete_dependencies_for(&self, id: &InstanceId) -> StoreResult<(usize, usize)>;
}

/// Device routings and their schedules.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn list_enabled_schedules(&self) -> StoreResult<Vec<RoutingSchedule>>;

    async fn get_routing(&self, id: &str) -> StoreResult<DeviceRouting>;

    async fn set_routing_active(&self, id: &str, active: bool) -> StoreResult<()>;

    async fn set_kill_switch_active(&self, id: &str, active: bool) -> StoreResult<()>;

    async fn mark_schedule_activated(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;

    async fn mark_schedule_deactivated(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;
}
