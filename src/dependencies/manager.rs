//! Dependency CRUD and startup planning.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use crate::dependencies::{graph::layered_order, DependencyError};
use crate::events::{Event, EventBus, Publisher};
use crate::model::{DependencyType, InstanceId, ServiceDependency};
use crate::store::InstanceStore;

/// Request to declare `from` depends on `to`.
#[derive(Debug, Clone)]
pub struct NewDependency {
    pub from: InstanceId,
    pub to: InstanceId,
    pub dependency_type: DependencyType,
    pub auto_start: bool,
    pub health_timeout_secs: u32,
}

impl NewDependency {
    pub fn required(from: impl Into<InstanceId>, to: impl Into<InstanceId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            dependency_type: DependencyType::Required,
            auto_start: true,
            health_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub instance_id: InstanceId,
    pub instance_name: String,
    pub feature_id: String,
    pub auto_start: bool,
}

/// Instances on one router and the edges among them.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<ServiceDependency>,
}

pub struct DependencyManager {
    store: Arc<dyn InstanceStore>,
    publisher: Publisher,
}

impl DependencyManager {
    pub fn new(store: Arc<dyn InstanceStore>, event_bus: Option<Arc<dyn EventBus>>) -> Self {
        Self {
            store,
            publisher: Publisher::new(event_bus, "dependency-manager"),
        }
    }

    /// Start layers for `instance_ids`, honouring only edges inside the set.
    pub async fn compute_startup_order(
        &self,
        instance_ids: &[InstanceId],
    ) -> Result<Vec<Vec<InstanceId>>, DependencyError> {
        if instance_ids.is_empty() {
            return Ok(Vec::new());
        }

        let edges: Vec<(InstanceId, InstanceId)> = self
            .store
            .list_dependencies_from(instance_ids)
            .await?
            .into_iter()
            .map(|d| (d.from_instance_id, d.to_instance_id))
            .collect();

        let layers = layered_order(instance_ids, &edges)?;

        tracing::debug!(
            instances = instance_ids.len(),
            edges = edges.len(),
            layers = layers.len(),
            "Computed startup order"
        );
        Ok(layers)
    }

    pub async fn add_dependency(
        &self,
        request: NewDependency,
    ) -> Result<ServiceDependency, DependencyError> {
        let NewDependency {
            from,
            to,
            dependency_type,
            auto_start,
            health_timeout_secs,
        } = request;

        if from == to {
            return Err(DependencyError::SelfDependency(from));
        }
        for id in [&from, &to] {
            if !self.store.instance_exists(id).await? {
                return Err(DependencyError::InstanceNotFound(id.clone()));
            }
        }

        let existing = self.store.list_dependencies_from(&[from.clone()]).await?;
        if existing.iter().any(|d| d.to_instance_id == to) {
            return Err(DependencyError::Duplicate { from, to });
        }

        if let Some(path) = self.find_path(&to, &from).await? {
            let mut cycle = vec![from.clone()];
            cycle.extend(path);
            return Err(DependencyError::WouldCycle { path: cycle });
        }

        let dependency = ServiceDependency {
            id: uuid::Uuid::new_v4().to_string(),
            from_instance_id: from.clone(),
            to_instance_id: to.clone(),
            dependency_type,
            auto_start,
            health_timeout_secs,
        };
        self.store.insert_dependency(dependency.clone()).await?;

        tracing::info!(
            dependency_id = %dependency.id,
            from = %from,
            to = %to,
            "Dependency added"
        );
        self.publisher
            .publish(Event::DependencyAdded {
                from_instance_id: from,
                to_instance_id: to,
            })
            .await;

        Ok(dependency)
    }

    pub async fn remove_dependency(&self, id: &str) -> Result<ServiceDependency, DependencyError> {
        let removed = self.store.delete_dependency(id).await?;

        tracing::info!(
            dependency_id = %removed.id,
            from = %removed.from_instance_id,
            to = %removed.to_instance_id,
            "Dependency removed"
        );
        self.publisher
            .publish(Event::DependencyRemoved {
                from_instance_id: removed.from_instance_id.clone(),
                to_instance_id: removed.to_instance_id.clone(),
            })
            .await;

        Ok(removed)
    }

    /// Edges leaving `id`: what it needs.
    pub async fn get_dependencies(
        &self,
        id: &InstanceId,
    ) -> Result<Vec<ServiceDependency>, DependencyError> {
        Ok(self.store.list_dependencies_from(&[id.clone()]).await?)
    }

    /// Edges arriving at `id`: what needs it.
    pub async fn get_dependents(
        &self,
        id: &InstanceId,
    ) -> Result<Vec<ServiceDependency>, DependencyError> {
        Ok(self.store.list_dependencies_to(id).await?)
    }

    pub async fn get_full_graph(&self, router_id: &str) -> Result<DependencyGraph, DependencyError> {
        let instances = self.store.list_instances_by_router(router_id).await?;
        let ids: Vec<InstanceId> = instances.iter().map(|i| i.id.clone()).collect();
        let members: HashSet<&InstanceId> = ids.iter().collect();

        let edges = self
            .store
            .list_dependencies_from(&ids)
            .await?
            .into_iter()
            .filter(|d| members.contains(&d.to_instance_id))
            .collect();

        let nodes = instances
            .into_iter()
            .map(|i| GraphNode {
                instance_id: i.id,
                instance_name: i.instance_name,
                feature_id: i.feature_id,
                auto_start: i.auto_start,
            })
            .collect();

        Ok(DependencyGraph { nodes, edges })
    }

    /// Drop every edge touching `id`, typically before the instance is deleted.
    pub async fn cleanup_for_instance(&self, id: &InstanceId) -> Result<usize, DependencyError> {
        let (outgoing, incoming) = self.store.delete_dependencies_for(id).await?;
        if outgoing + incoming > 0 {
            tracing::info!(instance_id = %id, outgoing, incoming, "Removed instance dependencies");
        }
        Ok(outgoing + incoming)
    }

    /// Breadth-first search along "depends on" edges; returns `start..=target`.
    async fn find_path(
        &self,
        start: &InstanceId,
        target: &InstanceId,
    ) -> Result<Option<Vec<InstanceId>>, DependencyError> {
        let mut parents: HashMap<InstanceId, InstanceId> = HashMap::new();
        let mut visited: HashSet<InstanceId> = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([start.clone()]);

        while let Some(current) = queue.pop_front() {
            if &current == target {
                let mut path = vec![current];
                while let Some(parent) = path.last().and_then(|last| parents.get(last)) {
                    path.push(parent.clone());
                }
                path.reverse();
                return Ok(Some(path));
            }

            for dep in self.store.list_dependencies_from(&[current.clone()]).await? {
                if visited.insert(dep.to_instance_id.clone()) {
                    parents.insert(dep.to_instance_id.clone(), current.clone());
                    queue.push_back(dep.to_instance_id);
                }
            }
        }

        Ok(None)
    }
}
