//! Layer-by-layer startup of auto-start instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::boot::{BootError, InstanceStarter, StartError};
use crate::dependencies::DependencyManager;
use crate::events::{Event, EventBus, Publisher};
use crate::model::{InstanceId, ServiceInstance};
use crate::observability::metrics;
use crate::store::InstanceStore;

/// Default per-instance start budget, health checks included.
pub const DEFAULT_INSTANCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a boot sequence that started every instance.
#[derive(Debug, Clone, Default)]
pub struct BootSummary {
    pub total: usize,
    pub layers: usize,
    pub started: Vec<InstanceId>,
    pub duration: Duration,
}

/// Result of starting one layer.
struct LayerOutcome {
    started: Vec<InstanceId>,
    failed: Vec<(InstanceId, StartError)>,
}

pub struct BootSequenceManager {
    store: Arc<dyn InstanceStore>,
    dependencies: Arc<DependencyManager>,
    starter: Arc<dyn InstanceStarter>,
    publisher: Publisher,
    instance_timeout: Duration,
}

impl BootSequenceManager {
    pub fn new(
        store: Arc<dyn InstanceStore>,
        dependencies: Arc<DependencyManager>,
        starter: Arc<dyn InstanceStarter>,
        event_bus: Option<Arc<dyn EventBus>>,
    ) -> Self {
        Self {
            store,
            dependencies,
            starter,
            publisher: Publisher::new(event_bus, "boot-sequence"),
            instance_timeout: DEFAULT_INSTANCE_TIMEOUT,
        }
    }

    pub fn with_instance_timeout(mut self, timeout: Duration) -> Self {
        self.instance_timeout = timeout;
        self
    }

    /// Start every auto-start instance in dependency order.
    ///
    /// Cancelling `cancel` aborts the in-flight layer; its unfinished
    /// instances count as failed. Dropping the returned future cancels
    /// the in-flight layer as well.
    pub async fn execute_boot_sequence(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BootSummary, BootError> {
        let begun = Instant::now();

        let instances = self.store.list_auto_start_instances().await?;
        if instances.is_empty() {
            tracing::info!("No auto-start instances, boot sequence skipped");
            return Ok(BootSummary::default());
        }

        let ids: Vec<InstanceId> = instances.iter().map(|i| i.id.clone()).collect();
        tracing::info!(instances = ids.len(), "Starting boot sequence");
        self.publisher
            .publish(Event::BootSequenceStarted {
                instance_ids: ids.clone(),
            })
            .await;

        let layers = match self.dependencies.compute_startup_order(&ids).await {
            Ok(layers) => layers,
            Err(e) => {
                tracing::error!(error = %e, "Boot sequence aborted: cannot order instances");
                self.publisher
                    .publish(Event::BootSequenceFailed {
                        layer: None,
                        failed_instance_id: None,
                        error: e.to_string(),
                        started_ids: Vec::new(),
                    })
                    .await;
                return Err(BootError::Plan(e));
            }
        };

        let by_id: HashMap<InstanceId, ServiceInstance> =
            instances.into_iter().map(|i| (i.id.clone(), i)).collect();

        let mut started = Vec::new();
        let mut failed = Vec::new();

        for (index, layer) in layers.iter().enumerate() {
            tracing::info!(layer = index, instances = ?layer, "Starting layer");

            let members: Vec<ServiceInstance> = layer
                .iter()
                .filter_map(|id| by_id.get(id).cloned())
                .collect();
            let outcome = self.start_layer(members, cancel).await;

            self.publisher
                .publish(Event::BootSequenceLayerComplete {
                    layer: index,
                    instance_ids: layer.clone(),
                    success_count: outcome.started.len(),
                    failure_count: outcome.failed.len(),
                })
                .await;

            started.extend(outcome.started);

            if let Some((first_id, first_error)) = outcome.failed.first() {
                tracing::error!(
                    layer = index,
                    failed = outcome.failed.len(),
                    remaining_layers = layers.len() - index - 1,
                    "Layer failed, aborting boot sequence"
                );
                self.publisher
                    .publish(Event::BootSequenceFailed {
                        layer: Some(index),
                        failed_instance_id: Some(first_id.clone()),
                        error: first_error.to_string(),
                        started_ids: started.clone(),
                    })
                    .await;
                failed.extend(outcome.failed.into_iter().map(|(id, _)| id));
                break;
            }
        }

        let duration = begun.elapsed();
        metrics::record_boot_duration(duration);
        self.publisher
            .publish(Event::BootSequenceComplete {
                total_instances: ids.len(),
                started_instances: started.len(),
                failed_instances: failed.len(),
                duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                failed_ids: failed.clone(),
            })
            .await;

        if !failed.is_empty() {
            return Err(BootError::Failed { failed, started });
        }

        tracing::info!(
            instances = started.len(),
            layers = layers.len(),
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "Boot sequence complete"
        );
        Ok(BootSummary {
            total: ids.len(),
            layers: layers.len(),
            started,
            duration,
        })
    }

    /// Start one layer concurrently. The first failure cancels the layer token.
    async fn start_layer(
        &self,
        instances: Vec<ServiceInstance>,
        cancel: &CancellationToken,
    ) -> LayerOutcome {
        let layer_token = cancel.child_token();
        // Dropping this future mid-layer cancels the spawned starts.
        let guard = layer_token.clone().drop_guard();
        let timeout = self.instance_timeout;

        let handles: Vec<_> = instances
            .into_iter()
            .map(|instance| {
                let starter = Arc::clone(&self.starter);
                let token = layer_token.clone();
                let id = instance.id.clone();

                let handle = tokio::spawn(async move {
                    let result = tokio::select! {
                        biased;
                        result = tokio::time::timeout(
                            timeout,
                            starter.start_instance(&instance, token.clone()),
                        ) => result.unwrap_or(Err(StartError::TimedOut(timeout))),
                        _ = token.cancelled() => Err(StartError::Cancelled),
                    };
                    if result.is_err() {
                        token.cancel();
                    }
                    result
                });
                (id, handle)
            })
            .collect();

        let mut outcome = LayerOutcome {
            started: Vec::new(),
            failed: Vec::new(),
        };

        for (id, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(StartError::Failed(format!("start task aborted: {e}"))));

            metrics::record_boot_instance(result.is_ok());
            match result {
                Ok(()) => {
                    tracing::info!(instance_id = %id, "Instance started");
                    outcome.started.push(id);
                }
                Err(e) => {
                    if matches!(e, StartError::Cancelled) {
                        tracing::warn!(instance_id = %id, "Instance start cancelled");
                    } else {
                        layer_token.cancel();
                        tracing::error!(instance_id = %id, error = %e, "Instance failed to start");
                    }
                    outcome.failed.push((id, e));
                }
            }
        }

        guard.disarm();

        // Report the root cause ahead of cancelled siblings.
        outcome
            .failed
            .sort_by_key(|(_, e)| matches!(e, StartError::Cancelled));
        outcome
    }
}
