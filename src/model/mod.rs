//! Entities shared by the orchestration components.
//!
//! All entities are owned by the persistence collaborator (`crate::store`);
//! the orchestration core reads them and only ever writes the routing
//! activation state and schedule timestamps.

pub mod instance;
pub mod routing;

pub use instance::{
    join_ids, DependencyType, InstanceId, PortAllocation, Protocol, ServiceDependency,
    ServiceInstance,
};
pub use routing::{DeviceRouting, KillSwitchMode, RoutingSchedule};
