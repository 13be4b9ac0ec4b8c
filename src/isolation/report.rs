//! Verification results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::ViolationType;
use crate::model::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// The four independent pre-start checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IsolationLayer {
    #[serde(rename = "IP Binding")]
    IpBinding,
    #[serde(rename = "Directory")]
    Directory,
    #[serde(rename = "Port Registry")]
    PortRegistry,
    #[serde(rename = "Process Binding")]
    ProcessBinding,
}

impl IsolationLayer {
    pub fn name(&self) -> &'static str {
        match self {
            IsolationLayer::IpBinding => "IP Binding",
            IsolationLayer::Directory => "Directory",
            IsolationLayer::PortRegistry => "Port Registry",
            IsolationLayer::ProcessBinding => "Process Binding",
        }
    }

    /// Event category for blocking findings; the advisory layer has none.
    pub fn violation_type(&self) -> Option<ViolationType> {
        match self {
            IsolationLayer::IpBinding => Some(ViolationType::IpBinding),
            IsolationLayer::Directory => Some(ViolationType::FilesystemAccess),
            IsolationLayer::PortRegistry => Some(ViolationType::PortConflict),
            IsolationLayer::ProcessBinding => None,
        }
    }
}

impl fmt::Display for IsolationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub layer: IsolationLayer,
    pub description: String,
    pub severity: Severity,
}

/// Outcome of one `verify_pre_start` call. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct IsolationReport {
    pub instance_id: InstanceId,
    pub passed: bool,
    /// Address proven by Layer 1; empty when Layer 1 failed.
    pub bind_ip: String,
    pub allocated_ports: Vec<u16>,
    pub violations: Vec<Violation>,
    pub checked_at: DateTime<Utc>,
}

impl IsolationReport {
    pub(crate) fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            passed: true,
            bind_ip: String::new(),
            allocated_ports: Vec::new(),
            violations: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    pub(crate) fn push(&mut self, layer: IsolationLayer, severity: Severity, description: String) {
        self.violations.push(Violation {
            layer,
            description,
            severity,
        });
        self.passed = !self.has_errors();
    }

    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
    }

    /// `layer: description` for every blocking finding, joined with `; `.
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(|v| format!("{}: {}", v.layer, v.description))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_tracks_error_severity_only() {
        let mut report = IsolationReport::new("tor-1".into());
        assert!(report.passed);

        report.push(
            IsolationLayer::ProcessBinding,
            Severity::Warning,
            "existing listener".into(),
        );
        assert!(report.passed);

        report.push(IsolationLayer::Directory, Severity::Error, "escape".into());
        assert!(!report.passed);
        assert_eq!(report.error_summary(), "Directory: escape");
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_layer_serializes_with_display_name() {
        let json = serde_json::to_value(IsolationLayer::PortRegistry).unwrap();
        assert_eq!(json, "Port Registry");
    }
}
