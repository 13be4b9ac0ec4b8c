//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use service_orchestrator::boot::{InstanceStarter, StartError};
use service_orchestrator::isolation::binding::config_file_name;
use service_orchestrator::model::{
    DependencyType, InstanceId, PortAllocation, Protocol, ServiceDependency, ServiceInstance,
};
use service_orchestrator::store::MemoryStore;

/// Lay out `<base>/<id>/bin/<feature>` and `<base>/<id>/config/<file>`.
///
/// The bin directory gets mode 0750 so the directory layer passes.
pub fn install_instance(
    base: &Path,
    id: &str,
    feature: &str,
    ports: &[u16],
    config: &str,
) -> ServiceInstance {
    let root = base.join(id);
    let bin_dir = root.join("bin");
    let config_dir = root.join("config");
    fs::create_dir_all(&bin_dir).unwrap();
    fs::create_dir_all(&config_dir).unwrap();

    let binary = bin_dir.join(feature);
    fs::write(&binary, b"#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&bin_dir, fs::Permissions::from_mode(0o750)).unwrap();
    fs::write(config_dir.join(config_file_name(feature)), config).unwrap();

    ServiceInstance {
        id: id.into(),
        feature_id: feature.into(),
        instance_name: format!("{feature} ({id})"),
        router_id: "router-1".into(),
        bind_ip: String::new(),
        ports: ports.to_vec(),
        binary_path: binary.to_string_lossy().into_owned(),
        auto_start: true,
    }
}

/// Register every declared port of `instance` with the registry.
pub fn allocate_ports(store: &MemoryStore, instance: &ServiceInstance) {
    for port in &instance.ports {
        store.put_allocation(PortAllocation {
            router_id: instance.router_id.clone(),
            port: *port,
            protocol: Protocol::Tcp,
            instance_id: instance.id.clone(),
            service_type: instance.feature_id.clone(),
        });
    }
}

/// Bare auto-start instance with no on-disk footprint.
pub fn auto_start_instance(id: &str) -> ServiceInstance {
    ServiceInstance {
        id: id.into(),
        feature_id: "tor".into(),
        instance_name: id.into(),
        router_id: "router-1".into(),
        bind_ip: "192.168.1.10".into(),
        ports: vec![9050],
        binary_path: String::new(),
        auto_start: true,
    }
}

pub fn depends_on(from: &str, to: &str) -> ServiceDependency {
    ServiceDependency {
        id: format!("{from}->{to}"),
        from_instance_id: from.into(),
        to_instance_id: to.into(),
        dependency_type: DependencyType::Required,
        auto_start: true,
        health_timeout_secs: 30,
    }
}

#[derive(Clone, Copy)]
pub enum Behaviour {
    Succeed,
    FailAfter(Duration),
    SucceedAfter(Duration),
}

/// Starter whose outcome per instance is scripted; records every call.
#[derive(Default)]
pub struct ScriptedStarter {
    behaviours: HashMap<String, Behaviour>,
    attempted: Mutex<Vec<InstanceId>>,
    started: Mutex<Vec<InstanceId>>,
}

impl ScriptedStarter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(id.to_string(), behaviour);
        self
    }

    pub fn attempted(&self) -> Vec<InstanceId> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<InstanceId> {
        let mut ids = self.started.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl InstanceStarter for ScriptedStarter {
    async fn start_instance(
        &self,
        instance: &ServiceInstance,
        cancel: CancellationToken,
    ) -> Result<(), StartError> {
        self.attempted.lock().unwrap().push(instance.id.clone());

        let behaviour = self
            .behaviours
            .get(instance.id.as_str())
            .copied()
            .unwrap_or(Behaviour::Succeed);

        match behaviour {
            Behaviour::Succeed => {}
            Behaviour::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                return Err(StartError::Failed("health check failed".into()));
            }
            Behaviour::SucceedAfter(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(StartError::Cancelled),
                }
            }
        }

        self.started.lock().unwrap().push(instance.id.clone());
        Ok(())
    }
}
