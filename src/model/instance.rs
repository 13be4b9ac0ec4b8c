//! Service instance, dependency and port allocation entities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Strongly typed service instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Render ids as `a<sep>b<sep>c`.
pub fn join_ids(ids: &[InstanceId], sep: &str) -> String {
    ids.iter().map(InstanceId::as_str).collect::<Vec<_>>().join(sep)
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One installed copy of a downloadable service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: InstanceId,
    /// Service type, e.g. `tor` or `sing-box`.
    pub feature_id: String,
    #[serde(default)]
    pub instance_name: String,
    /// Router the instance runs on; may be empty before association.
    #[serde(default)]
    pub router_id: String,
    #[serde(default)]
    pub bind_ip: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub binary_path: String,
    #[serde(default)]
    pub auto_start: bool,
}

/// How strictly a dependent needs its dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    #[default]
    Required,
    Optional,
}

/// Declared dependency: `from_instance_id` needs `to_instance_id` running first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDependency {
    pub id: String,
    pub from_instance_id: InstanceId,
    pub to_instance_id: InstanceId,
    #[serde(default)]
    pub dependency_type: DependencyType,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u32,
}

fn default_health_timeout() -> u32 {
    30
}

/// Transport protocol of an allocated port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// Port reservation held by the external port registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortAllocation {
    pub router_id: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    pub instance_id: InstanceId,
    pub service_type: String,
}
