//! Kill-switch hook invoked on routing transitions.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::DeviceRouting;

#[derive(Debug, Error)]
#[error("kill switch operation failed: {0}")]
pub struct KillSwitchError(pub String);

/// Applies or lifts a routing's kill switch on the router.
#[async_trait]
pub trait KillSwitchCoordinator: Send + Sync {
    /// Routing left its window: hold traffic per `kill_switch_mode`.
    async fn suspend_routing(&self, routing: &DeviceRouting) -> Result<(), KillSwitchError>;

    /// Routing entered its window: restore normal forwarding.
    async fn resume_routing(&self, routing: &DeviceRouting) -> Result<(), KillSwitchError>;
}
