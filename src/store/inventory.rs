//! JSON inventory used to seed a [`MemoryStore`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{
    DeviceRouting, PortAllocation, RoutingSchedule, ServiceDependency, ServiceInstance,
};
use crate::scheduling::validation::validate_schedule;
use crate::store::{MemoryStore, StoreError, StoreResult};

/// Snapshot of every entity the orchestrator reads.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Inventory {
    pub instances: Vec<ServiceInstance>,
    pub dependencies: Vec<ServiceDependency>,
    pub port_allocations: Vec<PortAllocation>,
    pub routings: Vec<DeviceRouting>,
    pub schedules: Vec<RoutingSchedule>,
}

impl Inventory {
    /// Read an inventory from a JSON file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Backend(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Backend(format!("parse {}: {}", path.display(), e)))
    }

    /// Build a store, rejecting schedules that could never be evaluated.
    pub fn into_store(self) -> StoreResult<MemoryStore> {
        for schedule in &self.schedules {
            validate_schedule(schedule).map_err(|e| StoreError::Invalid {
                entity: "schedule",
                id: schedule.id.clone(),
                reason: e.to_string(),
            })?;
        }

        let store = MemoryStore::new();
        for instance in self.instances {
            store.put_instance(instance);
        }
        for dependency in self.dependencies {
            store.put_dependency(dependency);
        }
        for allocation in self.port_allocations {
            store.put_allocation(allocation);
        }
        for routing in self.routings {
            store.put_routing(routing);
        }
        for schedule in self.schedules {
            store.put_schedule(schedule);
        }

        tracing::info!("Inventory loaded into memory store");
        Ok(store)
    }
}
