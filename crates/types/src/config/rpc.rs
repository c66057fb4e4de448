//! Service table and discovery backend configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::{Address, ServiceTopology};

fn default_listen_ip() -> String {
    "127.0.0.1".to_string()
}

/// Static RPC service table.
///
/// All services share `listen_ip`; each declares one or more ports
/// (several ports means several instances on the same host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// IP every service listens on.
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    /// `host:port` this process advertises for itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,
    /// Service name → listen ports.
    #[serde(default)]
    pub services: BTreeMap<String, Vec<u16>>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { listen_ip: default_listen_ip(), advertise_addr: None, services: BTreeMap::new() }
    }
}

impl RpcConfig {
    /// Validates the service table and advertised address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the listen IP is empty, a
    /// service has no ports, or the advertised address is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.topology()?;
        self.self_address()?;
        Ok(())
    }

    /// Builds the immutable topology.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on an empty listen IP or port list.
    pub fn topology(&self) -> Result<ServiceTopology, ConfigError> {
        ServiceTopology::new(
            self.listen_ip.clone(),
            self.services.iter().map(|(name, ports)| (name.as_str(), ports.clone())),
        )
    }

    /// Parses the advertised address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `advertise_addr` is not `host:port`.
    pub fn self_address(&self) -> Result<Option<Address>, ConfigError> {
        self.advertise_addr
            .as_deref()
            .map(|raw| {
                raw.parse::<Address>()
                    .map_err(|e| ConfigError::Validation { message: format!("advertise_addr: {e}") })
            })
            .transpose()
    }
}

/// Which discovery backend serves connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum BackendKind {
    /// Static, config-declared topology; no external registry.
    #[default]
    Direct,
}

/// Discovery backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Selected backend.
    #[serde(default)]
    pub backend: BackendKind,
}
