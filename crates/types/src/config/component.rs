//! Startup dependency configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::Address;

fn default_component_timeout() -> Duration {
    Duration::from_secs(3)
}

/// An infrastructure dependency that must be reachable before startup
/// (database, object storage, cache, coordination service, broker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Display name, e.g. `redis`.
    pub name: String,
    /// `host:port` endpoints; every one must accept a connection.
    pub addresses: Vec<String>,
    /// Per-address connect timeout.
    #[serde(default = "default_component_timeout", with = "super::humantime_serde")]
    pub timeout: Duration,
}

impl ComponentConfig {
    /// Parses the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the component and the bad entry.
    pub fn parsed_addresses(&self) -> Result<Vec<Address>, ConfigError> {
        self.addresses
            .iter()
            .map(|raw| {
                raw.parse::<Address>().map_err(|e| ConfigError::Validation {
                    message: format!("component '{}': {e}", self.name),
                })
            })
            .collect()
    }

    /// Validates name, addresses, and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "component name must not be empty".to_string(),
            });
        }
        if self.addresses.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("component '{}' must list at least one address", self.name),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: format!("component '{}' timeout must be > 0", self.name),
            });
        }
        self.parsed_addresses()?;
        Ok(())
    }
}
