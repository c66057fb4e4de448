//! Configuration types for meshlink.
//!
//! Configuration is loaded from TOML files and environment variables by the
//! binaries; this module only defines the shapes and their validation.
//! Config structs with numeric limits are built through fallible builders,
//! and every struct exposes `validate()` for post-deserialization checks.

mod component;
mod dial;
mod rpc;

pub use component::ComponentConfig;
pub use dial::{DialConfig, HealthProbeConfig, TlsConfig};
pub use rpc::{BackendKind, DiscoveryConfig, RpcConfig};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::{Address, ServiceTopology};

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Top-level meshlink configuration.
///
/// ```toml
/// [rpc]
/// listen_ip = "127.0.0.1"
///
/// [rpc.services]
/// user = [10110]
/// msg = [10130, 10131]
///
/// [dial]
/// connect_timeout = "5s"
///
/// [dial.health_probe]
/// interval = "30s"
///
/// [[components]]
/// name = "redis"
/// addresses = ["127.0.0.1:16379"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Static service table and shared listen IP.
    pub rpc: RpcConfig,
    /// Discovery backend selection.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Transport settings applied to every dial.
    #[serde(default)]
    pub dial: DialConfig,
    /// Infrastructure dependencies checked before startup.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl MeshConfig {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc.validate()?;
        self.dial.validate()?;
        for component in &self.components {
            component.validate()?;
        }
        Ok(())
    }

    /// Builds the validated service topology.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any service has no ports.
    pub fn topology(&self) -> Result<ServiceTopology, ConfigError> {
        self.rpc.topology()
    }

    /// Returns the address this process advertises, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the advertised address is malformed.
    pub fn self_address(&self) -> Result<Option<Address>, ConfigError> {
        self.rpc.self_address()
    }
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
