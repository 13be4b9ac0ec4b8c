//! Event payload definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::InstanceId;

/// Category of an isolation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    IpBinding,
    FilesystemAccess,
    PortConflict,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::IpBinding => "ip_binding",
            ViolationType::FilesystemAccess => "filesystem_access",
            ViolationType::PortConflict => "port_conflict",
        }
    }
}

/// Severity attached to a published violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Critical,
    Warning,
}

/// Action taken in response to a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    BlockedStart,
}

/// A pre-start isolation check failed for an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationViolationEvent {
    pub instance_id: InstanceId,
    pub feature_id: String,
    pub router_id: String,
    pub violation_type: ViolationType,
    pub severity: ViolationSeverity,
    pub detected_at: DateTime<Utc>,
    pub action: ActionTaken,
    pub message: String,
    pub will_terminate: bool,
    pub affected_ports: Vec<u16>,
}

/// Every event the orchestrator emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    IsolationViolation(IsolationViolationEvent),

    BootSequenceStarted {
        instance_ids: Vec<InstanceId>,
    },

    BootSequenceLayerComplete {
        layer: usize,
        instance_ids: Vec<InstanceId>,
        success_count: usize,
        failure_count: usize,
    },

    BootSequenceFailed {
        /// `None` when no layer ran (startup order could not be computed).
        layer: Option<usize>,
        failed_instance_id: Option<InstanceId>,
        error: String,
        started_ids: Vec<InstanceId>,
    },

    BootSequenceComplete {
        total_instances: usize,
        started_instances: usize,
        failed_instances: usize,
        duration_ms: u64,
        failed_ids: Vec<InstanceId>,
    },

    ScheduleActivated {
        schedule_id: String,
        routing_id: String,
        device_mac: String,
        instance_id: String,
    },

    ScheduleDeactivated {
        schedule_ids: Vec<String>,
        routing_id: String,
        device_mac: String,
        instance_id: String,
    },

    DependencyAdded {
        from_instance_id: InstanceId,
        to_instance_id: InstanceId,
    },

    DependencyRemoved {
        from_instance_id: InstanceId,
        to_instance_id: InstanceId,
    },
}

impl Event {
    /// Stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::IsolationViolation(_) => "isolation.violation",
            Event::BootSequenceStarted { .. } => "boot.started",
            Event::BootSequenceLayerComplete { .. } => "boot.layer_complete",
            Event::BootSequenceFailed { .. } => "boot.failed",
            Event::BootSequenceComplete { .. } => "boot.complete",
            Event::ScheduleActivated { .. } => "schedule.activated",
            Event::ScheduleDeactivated { .. } => "schedule.deactivated",
            Event::DependencyAdded { .. } => "dependency.added",
            Event::DependencyRemoved { .. } => "dependency.removed",
        }
    }
}

/// Event plus delivery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    /// Component that emitted the event.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(source: impl Into<String>, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::BootSequenceStarted {
            instance_ids: vec!["tor-1".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "boot_sequence_started");
        assert_eq!(json["instance_ids"][0], "tor-1");
    }

    #[test]
    fn test_violation_type_names() {
        assert_eq!(ViolationType::IpBinding.as_str(), "ip_binding");
        assert_eq!(
            serde_json::to_value(ViolationType::FilesystemAccess).unwrap(),
            "filesystem_access"
        );
    }
}
