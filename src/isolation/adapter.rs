//! File-backed bind-address validation for Layer 1.
//!
//! Config lookup order:
//! 1. `<binary_path>/../../config/<file>` (the service's own install tree)
//! 2. `<config_root>/<instance_id>/config/<file>`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::isolation::binding::{config_file_name, BindingError, ConfigBindingValidator, ServiceType};
use crate::model::ServiceInstance;

/// Source of a verified bind address for an instance.
#[async_trait]
pub trait ConfigBindingValidatorPort: Send + Sync {
    /// First non-wildcard listen address from the instance's config.
    async fn validate_binding(&self, instance: &ServiceInstance) -> Result<String, BindingError>;
}

/// Reads an instance's config file from disk and validates its listeners.
#[derive(Debug, Clone)]
pub struct ConfigValidatorAdapter {
    validator: ConfigBindingValidator,
    config_root: PathBuf,
}

impl ConfigValidatorAdapter {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            validator: ConfigBindingValidator::new(),
            config_root: config_root.into(),
        }
    }

    /// Candidate config paths, most specific first.
    pub fn candidate_paths(&self, instance: &ServiceInstance) -> Vec<PathBuf> {
        let file_name = config_file_name(&instance.feature_id);
        let mut paths = Vec::with_capacity(2);

        if !instance.binary_path.is_empty() {
            let install_dir = Path::new(&instance.binary_path)
                .parent()
                .and_then(Path::parent);
            if let Some(dir) = install_dir {
                paths.push(dir.join("config").join(file_name));
            }
        }

        let fallback = self
            .config_root
            .join(instance.id.as_str())
            .join("config")
            .join(file_name);
        if !paths.contains(&fallback) {
            paths.push(fallback);
        }
        paths
    }

    async fn read_config(&self, instance: &ServiceInstance) -> Result<String, BindingError> {
        let paths = self.candidate_paths(instance);

        for path in &paths {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    tracing::debug!(
                        instance_id = %instance.id,
                        path = %path.display(),
                        "Loaded service config"
                    );
                    return Ok(content);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(BindingError::Io {
                        path: path.display().to_string(),
                        source: e,
                    })
                }
            }
        }

        Err(BindingError::ConfigNotFound {
            instance_id: instance.id.to_string(),
            tried: paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

#[async_trait]
impl ConfigBindingValidatorPort for ConfigValidatorAdapter {
    async fn validate_binding(&self, instance: &ServiceInstance) -> Result<String, BindingError> {
        let service: ServiceType = instance.feature_id.parse()?;
        let content = self.read_config(instance).await?;

        let addresses = self
            .validator
            .extract_bind_ips(service.as_str(), &content)?;

        addresses
            .into_iter()
            .next()
            .ok_or(BindingError::NoBindAddress { service })
    }
}
