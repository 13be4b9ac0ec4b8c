//! Device routing assignments and their activation schedules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happens to a device's traffic while its routing is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillSwitchMode {
    #[default]
    BlockAll,
    FallbackService,
    AllowDirect,
}

/// A device routed through a service instance.
///
/// `active` is written only by the schedule evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRouting {
    pub id: String,
    pub router_id: String,
    #[serde(default)]
    pub device_mac: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub kill_switch_enabled: bool,
    #[serde(default)]
    pub kill_switch_mode: KillSwitchMode,
    #[serde(default)]
    pub kill_switch_active: bool,
}

/// A recurring weekly window during which a routing should be active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSchedule {
    pub id: String,
    pub routing_id: String,
    /// Weekdays, 0 = Sunday .. 6 = Saturday.
    pub days: Vec<u8>,
    /// `HH:MM`, 24-hour.
    pub start_time: String,
    /// `HH:MM`, 24-hour. Earlier than `start_time` means the window runs overnight.
    pub end_time: String,
    /// IANA zone name, e.g. `America/New_York`.
    pub timezone: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_activated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_deactivated: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}
