//! The pre-start security gate.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::events::{
    ActionTaken, Event, EventBus, IsolationViolationEvent, Publisher, ViolationSeverity,
};
use crate::isolation::adapter::ConfigBindingValidatorPort;
use crate::isolation::filesystem::check_binary_directory;
use crate::isolation::probe::{ListenerProbe, NoopListenerProbe};
use crate::isolation::report::{IsolationLayer, IsolationReport, Severity};
use crate::model::{InstanceId, PortAllocation, ServiceInstance};
use crate::observability::metrics;

/// Default root every service binary must live under.
pub const DEFAULT_ALLOWED_BASE_DIR: &str = "/data/services";

#[derive(Debug, Error)]
#[error("port registry unavailable: {0}")]
pub struct PortRegistryError(pub String);

/// Authoritative source of port allocations.
#[async_trait]
pub trait PortRegistry: Send + Sync {
    async fn get_allocations_by_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<PortAllocation>, PortRegistryError>;
}

#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("isolation verifier requires a {0}")]
    MissingDependency(&'static str),
}

/// Builder for [`IsolationVerifier`]; the port registry is mandatory.
#[derive(Default)]
pub struct IsolationVerifierBuilder {
    port_registry: Option<Arc<dyn PortRegistry>>,
    config_validator: Option<Arc<dyn ConfigBindingValidatorPort>>,
    listener_probe: Option<Arc<dyn ListenerProbe>>,
    event_bus: Option<Arc<dyn EventBus>>,
    allowed_base_dir: Option<PathBuf>,
}

impl IsolationVerifierBuilder {
    pub fn port_registry(mut self, registry: Arc<dyn PortRegistry>) -> Self {
        self.port_registry = Some(registry);
        self
    }

    pub fn config_validator(mut self, validator: Arc<dyn ConfigBindingValidatorPort>) -> Self {
        self.config_validator = Some(validator);
        self
    }

    pub fn listener_probe(mut self, probe: Arc<dyn ListenerProbe>) -> Self {
        self.listener_probe = Some(probe);
        self
    }

    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn allowed_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.allowed_base_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<IsolationVerifier, IsolationError> {
        let port_registry = self
            .port_registry
            .ok_or(IsolationError::MissingDependency("port registry"))?;

        Ok(IsolationVerifier {
            port_registry,
            config_validator: self.config_validator,
            listener_probe: self
                .listener_probe
                .unwrap_or_else(|| Arc::new(NoopListenerProbe)),
            publisher: Publisher::new(self.event_bus, "isolation-verifier"),
            allowed_base_dir: self
                .allowed_base_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ALLOWED_BASE_DIR)),
        })
    }
}

/// Runs all four isolation layers against an instance.
///
/// Stateless between calls; safe to share across tasks.
pub struct IsolationVerifier {
    port_registry: Arc<dyn PortRegistry>,
    config_validator: Option<Arc<dyn ConfigBindingValidatorPort>>,
    listener_probe: Arc<dyn ListenerProbe>,
    publisher: Publisher,
    allowed_base_dir: PathBuf,
}

impl IsolationVerifier {
    pub fn builder() -> IsolationVerifierBuilder {
        IsolationVerifierBuilder::default()
    }

    /// Verify `instance` may start. Every layer runs regardless of the others.
    pub async fn verify_pre_start(&self, instance: &ServiceInstance) -> IsolationReport {
        let mut report = IsolationReport::new(instance.id.clone());

        self.check_ip_binding(instance, &mut report).await;
        self.check_directory(instance, &mut report).await;
        self.check_ports(instance, &mut report).await;
        self.check_process_binding(instance, &mut report).await;

        self.publish_violations(instance, &report).await;
        metrics::record_isolation_check(report.passed);

        if report.passed {
            tracing::info!(
                instance_id = %instance.id,
                bind_ip = %report.bind_ip,
                ports = ?report.allocated_ports,
                warnings = report.warnings().count(),
                "Isolation verification passed"
            );
        } else {
            tracing::error!(
                instance_id = %instance.id,
                errors = %report.error_summary(),
                "Isolation verification failed"
            );
        }

        report
    }

    async fn check_ip_binding(&self, instance: &ServiceInstance, report: &mut IsolationReport) {
        let layer = IsolationLayer::IpBinding;

        if let Some(validator) = &self.config_validator {
            match validator.validate_binding(instance).await {
                Ok(ip) => report.bind_ip = ip,
                Err(e) => report.push(layer, Severity::Error, e.to_string()),
            }
            return;
        }

        if instance.bind_ip.is_empty() {
            report.push(layer, Severity::Error, "bind IP is not set".to_string());
            return;
        }

        match instance.bind_ip.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => report.push(
                layer,
                Severity::Error,
                format!("wildcard binding detected: {ip} listens on all interfaces"),
            ),
            Ok(_) => report.bind_ip = instance.bind_ip.clone(),
            Err(_) => report.push(
                layer,
                Severity::Error,
                format!("bind IP {:?} is not a valid IP address", instance.bind_ip),
            ),
        }
    }

    async fn check_directory(&self, instance: &ServiceInstance, report: &mut IsolationReport) {
        for problem in check_binary_directory(&instance.binary_path, &self.allowed_base_dir).await
        {
            report.push(IsolationLayer::Directory, Severity::Error, problem);
        }
    }

    /// Queries the registry on every call; allocations are never cached.
    async fn check_ports(&self, instance: &ServiceInstance, report: &mut IsolationReport) {
        let layer = IsolationLayer::PortRegistry;

        if instance.ports.is_empty() {
            report.push(layer, Severity::Error, "instance declares no ports".to_string());
            return;
        }

        let allocations = match self
            .port_registry
            .get_allocations_by_instance(&instance.id)
            .await
        {
            Ok(allocations) => allocations,
            Err(e) => {
                report.push(layer, Severity::Error, format!("port registry query failed: {e}"));
                return;
            }
        };

        if allocations.is_empty() {
            report.push(
                layer,
                Severity::Error,
                format!("no port allocations found for instance {}", instance.id),
            );
            return;
        }

        let allocated: HashSet<u16> = allocations.iter().map(|a| a.port).collect();
        for port in &instance.ports {
            if !allocated.contains(port) {
                report.push(
                    layer,
                    Severity::Error,
                    format!("port {port} is not allocated to instance {}", instance.id),
                );
            }
        }

        let mut ports: Vec<u16> = allocated.into_iter().collect();
        ports.sort_unstable();
        report.allocated_ports = ports;
    }

    async fn check_process_binding(&self, instance: &ServiceInstance, report: &mut IsolationReport) {
        let candidate = if report.bind_ip.is_empty() {
            &instance.bind_ip
        } else {
            &report.bind_ip
        };
        let Ok(ip) = candidate.parse::<IpAddr>() else {
            return;
        };

        match self.listener_probe.listening_ports(ip).await {
            Ok(ports) if !ports.is_empty() => {
                tracing::warn!(
                    instance_id = %instance.id,
                    %ip,
                    ?ports,
                    "Existing listeners found on instance bind address"
                );
                report.push(
                    IsolationLayer::ProcessBinding,
                    Severity::Warning,
                    format!("{} existing listener(s) on {ip}: ports {ports:?}", ports.len()),
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(instance_id = %instance.id, error = %e, "Listener probe failed");
            }
        }
    }

    async fn publish_violations(&self, instance: &ServiceInstance, report: &IsolationReport) {
        for violation in report.errors() {
            let Some(violation_type) = violation.layer.violation_type() else {
                continue;
            };
            metrics::record_isolation_violation(violation_type.as_str());

            self.publisher
                .publish(Event::IsolationViolation(IsolationViolationEvent {
                    instance_id: instance.id.clone(),
                    feature_id: instance.feature_id.clone(),
                    router_id: instance.router_id.clone(),
                    violation_type,
                    severity: ViolationSeverity::Critical,
                    detected_at: Utc::now(),
                    action: ActionTaken::BlockedStart,
                    message: format!("{}: {}", violation.layer, violation.description),
                    will_terminate: true,
                    affected_ports: instance.ports.clone(),
                }))
                .await;
        }
    }
}
