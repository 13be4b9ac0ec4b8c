//! In-memory entity store.
//!
//! Concurrent maps keyed by entity ID. Used by the binary (seeded from an
//! inventory file) and by tests.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::isolation::{PortRegistry, PortRegistryError};
use crate::model::{
    DeviceRouting, InstanceId, PortAllocation, RoutingSchedule, ServiceDependency, ServiceInstance,
};
use crate::store::{InstanceStore, RoutingStore, StoreError, StoreResult};

/// Thread-safe store holding every entity kind in its own map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    instances: DashMap<InstanceId, ServiceInstance>,
    dependencies: DashMap<String, ServiceDependency>,
    allocations: DashMap<InstanceId, Vec<PortAllocation>>,
    routings: DashMap<String, DeviceRouting>,
    schedules: DashMap<String, RoutingSchedule>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_instance(&self, instance: ServiceInstance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn put_dependency(&self, dependency: ServiceDependency) {
        self.dependencies.insert(dependency.id.clone(), dependency);
    }

    pub fn put_allocation(&self, allocation: PortAllocation) {
        self.allocations
            .entry(allocation.instance_id.clone())
            .or_default()
            .push(allocation);
    }

    /// Drop every port allocation held by an instance.
    pub fn release_allocations(&self, instance_id: &InstanceId) {
        self.allocations.remove(instance_id);
    }

    pub fn put_routing(&self, routing: DeviceRouting) {
        self.routings.insert(routing.id.clone(), routing);
    }

    pub fn put_schedule(&self, schedule: RoutingSchedule) {
        self.schedules.insert(schedule.id.clone(), schedule);
    }

    /// Current routing record, if any.
    pub fn routing(&self, id: &str) -> Option<DeviceRouting> {
        self.routings.get(id).map(|r| r.value().clone())
    }

    /// Current schedule record, if any.
    pub fn schedule(&self, id: &str) -> Option<RoutingSchedule> {
        self.schedules.get(id).map(|r| r.value().clone())
    }

    fn update_routing<F>(&self, id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut DeviceRouting),
    {
        let mut routing = self
            .routings
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("routing", id))?;
        f(routing.value_mut());
        Ok(())
    }

    fn update_schedule<F>(&self, id: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut RoutingSchedule),
    {
        let mut schedule = self
            .schedules
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("schedule", id))?;
        f(schedule.value_mut());
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn get_instance(&self, id: &InstanceId) -> StoreResult<ServiceInstance> {
        self.instances
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::not_found("instance", id.as_str()))
    }

    async fn instance_exists(&self, id: &InstanceId) -> StoreResult<bool> {
        Ok(self.instances.contains_key(id))
    }

    async fn list_auto_start_instances(&self) -> StoreResult<Vec<ServiceInstance>> {
        let mut instances: Vec<_> = self
            .instances
            .iter()
            .filter(|r| r.value().auto_start)
            .map(|r| r.value().clone())
            .collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    async fn list_instances_by_router(&self, router_id: &str) -> StoreResult<Vec<ServiceInstance>> {
        let mut instances: Vec<_> = self
            .instances
            .iter()
            .filter(|r| r.value().router_id == router_id)
            .map(|r| r.value().clone())
            .collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    async fn get_dependency(&self, id: &str) -> StoreResult<ServiceDependency> {
        self.dependencies
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::not_found("dependency", id))
    }

    async fn list_dependencies_from(&self, ids: &[InstanceId]) -> StoreResult<Vec<ServiceDependency>> {
        let wanted: HashSet<&InstanceId> = ids.iter().collect();
        let mut deps: Vec<_> = self
            .dependencies
            .iter()
            .filter(|r| wanted.contains(&r.value().from_instance_id))
            .map(|r| r.value().clone())
            .collect();
        deps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(deps)
    }

    async fn list_dependencies_to(&self, id: &InstanceId) -> StoreResult<Vec<ServiceDependency>> {
        let mut deps: Vec<_> = self
            .dependencies
            .iter()
            .filter(|r| &r.value().to_instance_id == id)
            .map(|r| r.value().clone())
            .collect();
        deps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(deps)
    }

    async fn insert_dependency(&self, dependency: ServiceDependency) -> StoreResult<()> {
        match self.dependencies.entry(dependency.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "dependency {} already exists",
                dependency.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(dependency);
                Ok(())
            }
        }
    }

    async fn delete_dependency(&self, id: &str) -> StoreResult<ServiceDependency> {
        self.dependencies
            .remove(id)
            .map(|(_, dep)| dep)
            .ok_or_else(|| StoreError::not_found("dependency", id))
    }

    async fn delete_dependencies_for(&self, id: &InstanceId) -> StoreResult<(usize, usize)> {
        let mut outgoing = 0;
        let mut incoming = 0;
        self.dependencies.retain(|_, dep| {
            if &dep.from_instance_id == id {
                outgoing += 1;
                false
            } else if &dep.to_instance_id == id {
                incoming += 1;
                false
            } else {
                true
            }
        });
        Ok((outgoing, incoming))
    }
}

#[async_trait]
impl RoutingStore for MemoryStore {
    async fn list_enabled_schedules(&self) -> StoreResult<Vec<RoutingSchedule>> {
        let mut schedules: Vec<_> = self
            .schedules
            .iter()
            .filter(|r| r.value().enabled)
            .map(|r| r.value().clone())
            .collect();
        schedules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(schedules)
    }

    async fn get_routing(&self, id: &str) -> StoreResult<DeviceRouting> {
        self.routing(id)
            .ok_or_else(|| StoreError::not_found("routing", id))
    }

    async fn set_routing_active(&self, id: &str, active: bool) -> StoreResult<()> {
        self.update_routing(id, |routing| routing.active = active)
    }

    async fn set_kill_switch_active(&self, id: &str, active: bool) -> StoreResult<()> {
        self.update_routing(id, |routing| routing.kill_switch_active = active)
    }

    async fn mark_schedule_activated(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.update_schedule(id, |schedule| schedule.last_activated = Some(at))
    }

    async fn mark_schedule_deactivated(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.update_schedule(id, |schedule| schedule.last_deactivated = Some(at))
    }
}

#[async_trait]
impl PortRegistry for MemoryStore {
    async fn get_allocations_by_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<PortAllocation>, PortRegistryError> {
        Ok(self
            .allocations
            .get(instance_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyType;

    fn instance(id: &str, router: &str, auto_start: bool) -> ServiceInstance {
        ServiceInstance {
            id: id.into(),
            feature_id: "tor".into(),
            instance_name: id.into(),
            router_id: router.into(),
            bind_ip: "10.0.0.1".into(),
            ports: vec![9050],
            binary_path: String::new(),
            auto_start,
        }
    }

    fn dependency(id: &str, from: &str, to: &str) -> ServiceDependency {
        ServiceDependency {
            id: id.into(),
            from_instance_id: from.into(),
            to_instance_id: to.into(),
            dependency_type: DependencyType::Required,
            auto_start: true,
            health_timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn test_auto_start_filter() {
        let store = MemoryStore::new();
        store.put_instance(instance("b", "r1", true));
        store.put_instance(instance("a", "r1", true));
        store.put_instance(instance("c", "r2", false));

        let ids: Vec<_> = store
            .list_auto_start_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![InstanceId::from("a"), InstanceId::from("b")]);

        let on_r2 = store.list_instances_by_router("r2").await.unwrap();
        assert_eq!(on_r2.len(), 1);
    }

    #[tokio::test]
    async fn test_dependency_queries_and_cleanup() {
        let store = MemoryStore::new();
        store.put_dependency(dependency("d1", "a", "b"));
        store.put_dependency(dependency("d2", "b", "c"));
        store.put_dependency(dependency("d3", "c", "a"));

        let from_b = store.list_dependencies_from(&["b".into()]).await.unwrap();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].to_instance_id, InstanceId::from("c"));

        let to_a = store.list_dependencies_to(&"a".into()).await.unwrap();
        assert_eq!(to_a[0].id, "d3");

        let counts = store.delete_dependencies_for(&"a".into()).await.unwrap();
        assert_eq!(counts, (1, 1));
        assert!(store.get_dependency("d2").await.is_ok());
        assert!(matches!(
            store.get_dependency("d1").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_dependency_id_conflicts() {
        let store = MemoryStore::new();
        store.insert_dependency(dependency("d1", "a", "b")).await.unwrap();
        let err = store.insert_dependency(dependency("d1", "x", "y")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_instance_has_no_allocations() {
        let store = MemoryStore::new();
        let allocs = store.get_allocations_by_instance(&"ghost".into()).await.unwrap();
        assert!(allocs.is_empty());
    }
}
