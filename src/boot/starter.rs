//! Instance start port and its decorators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::isolation::IsolationVerifier;
use crate::model::ServiceInstance;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("isolation check blocked start: {0}")]
    IsolationBlocked(String),

    #[error("start timed out after {0:?}")]
    TimedOut(Duration),

    #[error("start cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// Spawns and health-checks one instance.
///
/// Implementations should watch `cancel` during any polling so a cancelled
/// layer unwinds promptly.
#[async_trait]
pub trait InstanceStarter: Send + Sync {
    async fn start_instance(
        &self,
        instance: &ServiceInstance,
        cancel: CancellationToken,
    ) -> Result<(), StartError>;
}

/// Runs the isolation gate before delegating to the real starter.
pub struct VerifyingStarter {
    verifier: Arc<IsolationVerifier>,
    inner: Arc<dyn InstanceStarter>,
}

impl VerifyingStarter {
    pub fn new(verifier: Arc<IsolationVerifier>, inner: Arc<dyn InstanceStarter>) -> Self {
        Self { verifier, inner }
    }
}

#[async_trait]
impl InstanceStarter for VerifyingStarter {
    async fn start_instance(
        &self,
        instance: &ServiceInstance,
        cancel: CancellationToken,
    ) -> Result<(), StartError> {
        let report = self.verifier.verify_pre_start(instance).await;
        if !report.passed {
            return Err(StartError::IsolationBlocked(report.error_summary()));
        }
        self.inner.start_instance(instance, cancel).await
    }
}

/// Logs each start without spawning anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunStarter;

#[async_trait]
impl InstanceStarter for DryRunStarter {
    async fn start_instance(
        &self,
        instance: &ServiceInstance,
        cancel: CancellationToken,
    ) -> Result<(), StartError> {
        if cancel.is_cancelled() {
            return Err(StartError::Cancelled);
        }
        tracing::info!(
            instance_id = %instance.id,
            feature_id = %instance.feature_id,
            binary = %instance.binary_path,
            "Dry run: instance would start"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::{PortRegistry, PortRegistryError};
    use crate::model::{InstanceId, PortAllocation};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptyRegistry;

    #[async_trait]
    impl PortRegistry for EmptyRegistry {
        async fn get_allocations_by_instance(
            &self,
            _instance_id: &InstanceId,
        ) -> Result<Vec<PortAllocation>, PortRegistryError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct CountingStarter(AtomicUsize);

    #[async_trait]
    impl InstanceStarter for CountingStarter {
        async fn start_instance(
            &self,
            _instance: &ServiceInstance,
            _cancel: CancellationToken,
        ) -> Result<(), StartError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_verifying_starter_blocks_failed_report() {
        let verifier = IsolationVerifier::builder()
            .port_registry(Arc::new(EmptyRegistry))
            .build()
            .unwrap();
        let inner = Arc::new(CountingStarter::default());
        let starter = VerifyingStarter::new(Arc::new(verifier), inner.clone());

        let instance = ServiceInstance {
            id: "tor-1".into(),
            feature_id: "tor".into(),
            instance_name: "tor".into(),
            router_id: "router-1".into(),
            bind_ip: String::new(),
            ports: vec![],
            binary_path: String::new(),
            auto_start: true,
        };

        let err = starter
            .start_instance(&instance, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StartError::IsolationBlocked(_)));
        assert_eq!(inner.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_honours_cancellation() {
        let instance = ServiceInstance {
            id: "tor-1".into(),
            feature_id: "tor".into(),
            instance_name: "tor".into(),
            router_id: String::new(),
            bind_ip: String::new(),
            ports: vec![],
            binary_path: String::new(),
            auto_start: true,
        };
        let token = CancellationToken::new();
        assert!(DryRunStarter.start_instance(&instance, token.clone()).await.is_ok());

        token.cancel();
        assert!(matches!(
            DryRunStarter.start_instance(&instance, token).await,
            Err(StartError::Cancelled)
        ));
    }
}
