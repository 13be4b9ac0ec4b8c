//! Bind-address extraction from service configuration files.
//!
//! # Responsibilities
//! - Map a feature ID to its service type and config file name
//! - Parse each service's native config format for listen addresses
//! - Reject any wildcard listener
//!
//! # Design Decisions
//! - Pure functions over text; file access lives in `adapter.rs`
//! - A listener with no explicit address counts as a wildcard

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Addresses that listen on every interface.
pub const WILDCARD_ADDRESSES: [&str; 4] = ["", "0.0.0.0", "::", "*"];

/// Config file name used for feature IDs with no known service type.
pub const DEFAULT_CONFIG_FILE: &str = "config.conf";

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("unsupported service type: {0}")]
    UnsupportedServiceType(String),

    #[error("failed to parse {service} config: {reason}")]
    Parse {
        service: ServiceType,
        reason: String,
    },

    #[error("wildcard binding detected in {service} config: {address:?} listens on all interfaces")]
    Wildcard {
        service: ServiceType,
        address: String,
    },

    #[error("no bind address found in {service} config")]
    NoBindAddress { service: ServiceType },

    #[error("config file not found for instance {instance_id} (tried {tried})")]
    ConfigNotFound { instance_id: String, tried: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Downloadable services with a known config format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Tor,
    SingBox,
    XrayCore,
    MtProxy,
    AdGuardHome,
    Psiphon,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Tor => "tor",
            ServiceType::SingBox => "sing-box",
            ServiceType::XrayCore => "xray-core",
            ServiceType::MtProxy => "mtproxy",
            ServiceType::AdGuardHome => "adguard-home",
            ServiceType::Psiphon => "psiphon",
        }
    }

    /// File name of the service's config inside its `config/` directory.
    pub fn config_file_name(&self) -> &'static str {
        match self {
            ServiceType::Tor => "torrc",
            ServiceType::SingBox | ServiceType::XrayCore => "config.json",
            ServiceType::MtProxy => "mtproxy.conf",
            ServiceType::AdGuardHome => "AdGuardHome.yaml",
            ServiceType::Psiphon => "psiphon.config",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tor" => Ok(ServiceType::Tor),
            "sing-box" => Ok(ServiceType::SingBox),
            "xray-core" => Ok(ServiceType::XrayCore),
            "mtproxy" => Ok(ServiceType::MtProxy),
            "adguard-home" => Ok(ServiceType::AdGuardHome),
            "psiphon" => Ok(ServiceType::Psiphon),
            other => Err(BindingError::UnsupportedServiceType(other.to_string())),
        }
    }
}

/// Config file name for a feature ID, falling back to [`DEFAULT_CONFIG_FILE`].
pub fn config_file_name(feature_id: &str) -> &'static str {
    feature_id
        .parse::<ServiceType>()
        .map(|t| t.config_file_name())
        .unwrap_or(DEFAULT_CONFIG_FILE)
}

/// Extracts and vets listen addresses from service configs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigBindingValidator;

impl ConfigBindingValidator {
    pub fn new() -> Self {
        Self
    }

    /// Every listen address declared in `config`, in file order.
    ///
    /// Fails if the service type is unknown, the text is malformed, or any
    /// address is a wildcard.
    pub fn extract_bind_ips(
        &self,
        service_type: &str,
        config: &str,
    ) -> Result<Vec<String>, BindingError> {
        let service: ServiceType = service_type.parse()?;

        let addresses = match service {
            ServiceType::Tor => parse_torrc(config)?,
            ServiceType::SingBox | ServiceType::XrayCore => parse_inbounds(service, config)?,
            ServiceType::MtProxy => parse_mtproxy_flags(config)?,
            ServiceType::AdGuardHome => parse_adguard(config)?,
            ServiceType::Psiphon => parse_psiphon(config)?,
        };

        if let Some(address) = addresses
            .iter()
            .find(|a| WILDCARD_ADDRESSES.contains(&a.as_str()))
        {
            return Err(BindingError::Wildcard {
                service,
                address: address.clone(),
            });
        }

        Ok(addresses)
    }
}

/// Host part of `addr:port`, `[v6]:port` or a bare host.
///
/// A bare port number yields an empty host.
fn split_host(value: &str) -> Result<String, String> {
    let value = value.trim();

    if let Some(rest) = value.strip_prefix('[') {
        let (host, _) = rest
            .split_once(']')
            .ok_or_else(|| format!("unterminated IPv6 literal in {value:?}"))?;
        return Ok(host.to_string());
    }

    if value.chars().all(|c| c.is_ascii_digit()) {
        return Ok(String::new());
    }

    match value.rsplit_once(':') {
        // A second colon means an unbracketed IPv6 literal with no port.
        Some((host, _)) if host.contains(':') => Ok(value.to_string()),
        Some((host, _)) => Ok(host.to_string()),
        None => Ok(value.to_string()),
    }
}

fn parse_torrc(config: &str) -> Result<Vec<String>, BindingError> {
    let mut addresses = Vec::new();

    for line in config.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(directive) = parts.next() else {
            continue;
        };
        let directive_lower = directive.to_ascii_lowercase();
        // HiddenServicePort maps a virtual port to a target; it opens no listener.
        if !directive_lower.ends_with("port") || directive_lower == "hiddenserviceport" {
            continue;
        }

        let value = parts.next().ok_or_else(|| BindingError::Parse {
            service: ServiceType::Tor,
            reason: format!("{directive} has no value"),
        })?;
        // Port 0 disables the listener.
        if value == "0" {
            continue;
        }

        let host = split_host(value).map_err(|reason| BindingError::Parse {
            service: ServiceType::Tor,
            reason,
        })?;
        addresses.push(host);
    }

    Ok(addresses)
}

#[derive(Debug, Deserialize)]
struct InboundsConfig {
    #[serde(default)]
    inbounds: Vec<Inbound>,
}

#[derive(Debug, Deserialize)]
struct Inbound {
    #[serde(default)]
    listen: String,
}

fn parse_inbounds(service: ServiceType, config: &str) -> Result<Vec<String>, BindingError> {
    let parsed: InboundsConfig =
        serde_json::from_str(config).map_err(|e| BindingError::Parse {
            service,
            reason: e.to_string(),
        })?;

    Ok(parsed.inbounds.into_iter().map(|i| i.listen).collect())
}

fn parse_mtproxy_flags(config: &str) -> Result<Vec<String>, BindingError> {
    let parse_err = |reason: String| BindingError::Parse {
        service: ServiceType::MtProxy,
        reason,
    };

    let mut addresses = Vec::new();
    let mut tokens = config.split_whitespace();

    while let Some(token) = tokens.next() {
        let flag = token.trim_start_matches('-');
        if flag.len() == token.len() {
            continue;
        }

        let value = if flag == "bind-to" {
            tokens
                .next()
                .ok_or_else(|| parse_err(format!("{token} has no value")))?
        } else if let Some(value) = flag.strip_prefix("bind-to=") {
            value
        } else {
            continue;
        };

        addresses.push(split_host(value).map_err(parse_err)?);
    }

    Ok(addresses)
}

#[derive(Debug, Deserialize)]
struct AdGuardConfig {
    #[serde(default)]
    bind_host: Option<String>,
    #[serde(default)]
    dns: Option<AdGuardDns>,
}

#[derive(Debug, Deserialize)]
struct AdGuardDns {
    #[serde(default)]
    bind_hosts: Vec<String>,
}

fn parse_adguard(config: &str) -> Result<Vec<String>, BindingError> {
    let parsed: AdGuardConfig = match serde_yaml_bw::from_str(config) {
        Ok(parsed) => parsed,
        Err(e) => {
            // An unquoted `::` is not valid YAML but is still a wildcard bind.
            let scanned = scan_adguard_hosts(config);
            if scanned.iter().any(|a| WILDCARD_ADDRESSES.contains(&a.as_str())) {
                return Ok(scanned);
            }
            return Err(BindingError::Parse {
                service: ServiceType::AdGuardHome,
                reason: e.to_string(),
            });
        }
    };

    let mut addresses: Vec<String> = parsed.bind_host.into_iter().collect();
    if let Some(dns) = parsed.dns {
        addresses.extend(dns.bind_hosts);
    }
    Ok(addresses)
}

/// Line scan for `bind_host:` and the `bind_hosts:` list items.
fn scan_adguard_hosts(config: &str) -> Vec<String> {
    let unquote = |v: &str| v.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string();

    let mut addresses = Vec::new();
    let mut in_list = false;
    for line in config.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if in_list {
            if let Some(item) = trimmed.strip_prefix('-') {
                addresses.push(unquote(item));
                continue;
            }
            in_list = false;
        }

        if let Some(value) = trimmed.strip_prefix("bind_hosts:") {
            let value = value.trim();
            match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
                Some(items) => addresses.extend(items.split(',').map(unquote)),
                None => in_list = value.is_empty(),
            }
        } else if let Some(value) = trimmed.strip_prefix("bind_host:") {
            addresses.push(unquote(value));
        }
    }

    addresses.retain(|a| !a.is_empty());
    addresses
}

#[derive(Debug, Deserialize)]
struct PsiphonConfig {
    #[serde(rename = "ListenInterface", default)]
    listen_interface: String,
}

fn parse_psiphon(config: &str) -> Result<Vec<String>, BindingError> {
    let parsed: PsiphonConfig =
        serde_json::from_str(config).map_err(|e| BindingError::Parse {
            service: ServiceType::Psiphon,
            reason: e.to_string(),
        })?;

    Ok(vec![parsed.listen_interface])
}
