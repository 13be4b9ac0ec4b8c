//! Startup wiring.
//!
//! # Responsibilities
//! - Seed the entity store from the configured inventory
//! - Build every component with its collaborators injected explicitly
//!
//! # Design Decisions
//! - Fail fast: any wiring error is fatal
//! - One event bus shared by all components

use std::sync::Arc;

use thiserror::Error;

use crate::boot::{BootSequenceManager, InstanceStarter, VerifyingStarter};
use crate::config::OrchestratorConfig;
use crate::dependencies::DependencyManager;
use crate::events::{BroadcastEventBus, EventBus};
use crate::isolation::{detect_listener_probe, ConfigValidatorAdapter, IsolationError, IsolationVerifier};
use crate::scheduling::ScheduleEvaluator;
use crate::store::{Inventory, MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load inventory: {0}")]
    Inventory(#[from] StoreError),

    #[error(transparent)]
    Isolation(#[from] IsolationError),
}

/// Every orchestration component, wired from one configuration.
pub struct Orchestrator {
    pub config: OrchestratorConfig,
    pub store: Arc<MemoryStore>,
    pub events: Arc<BroadcastEventBus>,
    pub verifier: Arc<IsolationVerifier>,
    pub dependencies: Arc<DependencyManager>,
    pub boot: BootSequenceManager,
    pub scheduler: ScheduleEvaluator,
}

impl Orchestrator {
    /// Build all components. `starter` performs the actual spawn and is
    /// always preceded by the isolation gate.
    pub fn from_config(
        config: OrchestratorConfig,
        starter: Arc<dyn InstanceStarter>,
    ) -> Result<Self, StartupError> {
        let store = Arc::new(match &config.inventory_path {
            Some(path) => {
                let store = Inventory::load(path)?.into_store()?;
                tracing::info!(path = %path.display(), "Inventory loaded");
                store
            }
            None => {
                tracing::warn!("No inventory configured, starting with an empty store");
                MemoryStore::new()
            }
        });

        let events = Arc::new(BroadcastEventBus::default());
        let bus: Arc<dyn EventBus> = events.clone();

        let verifier = Arc::new(
            IsolationVerifier::builder()
                .port_registry(store.clone())
                .config_validator(Arc::new(ConfigValidatorAdapter::new(
                    config.isolation.config_root.clone(),
                )))
                .listener_probe(detect_listener_probe())
                .event_bus(bus.clone())
                .allowed_base_dir(config.isolation.allowed_base_dir.clone())
                .build()?,
        );

        let dependencies = Arc::new(DependencyManager::new(store.clone(), Some(bus.clone())));

        let boot = BootSequenceManager::new(
            store.clone(),
            dependencies.clone(),
            Arc::new(VerifyingStarter::new(verifier.clone(), starter)),
            Some(bus.clone()),
        )
        .with_instance_timeout(config.boot.instance_timeout());

        let scheduler = ScheduleEvaluator::builder(store.clone())
            .event_bus(bus)
            .interval(config.schedule.evaluation_interval())
            .max_clock_skew(config.schedule.max_clock_skew())
            .build();

        Ok(Self {
            config,
            store,
            events,
            verifier,
            dependencies,
            boot,
            scheduler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::DryRunStarter;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_wires_without_inventory() {
        let orchestrator =
            Orchestrator::from_config(OrchestratorConfig::default(), Arc::new(DryRunStarter))
                .unwrap();
        assert!(!orchestrator.scheduler.is_running());
    }

    #[test]
    fn test_bad_inventory_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let config = OrchestratorConfig {
            inventory_path: Some(file.path().to_path_buf()),
            ..OrchestratorConfig::default()
        };

        let err = Orchestrator::from_config(config, Arc::new(DryRunStarter))
            .err()
            .unwrap();
        assert!(matches!(err, StartupError::Inventory(_)));
    }
}
