//! Dial (client transport) configuration.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default connection establishment timeout (5 seconds).
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Default HTTP/2 keep-alive ping interval (30 seconds).
fn default_keepalive_interval() -> Duration {
    Duration::from_secs(30)
}

/// Default HTTP/2 keep-alive ping timeout (10 seconds).
fn default_keepalive_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Default minimum age of a cached channel's last probe before it is probed again (30 seconds).
fn default_probe_interval() -> Duration {
    Duration::from_secs(30)
}

/// Default upper bound for one health probe (2 seconds).
fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_probe_enabled() -> bool {
    true
}

/// Transport settings applied to every channel.
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use meshlink_types::config::DialConfig;
/// let config = DialConfig::builder()
///     .connect_timeout(Duration::from_secs(2))
///     .timeout(Duration::from_secs(30))
///     .build()
///     .expect("valid dial config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialConfig {
    /// Time allowed to establish a connection.
    #[serde(default = "default_connect_timeout", with = "super::humantime_serde")]
    pub connect_timeout: Duration,
    /// Per-request timeout; unbounded when unset.
    #[serde(
        default,
        with = "super::humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    /// HTTP/2 keep-alive ping interval.
    #[serde(default = "default_keepalive_interval", with = "super::humantime_serde")]
    pub keepalive_interval: Duration,
    /// HTTP/2 keep-alive ping timeout.
    #[serde(default = "default_keepalive_timeout", with = "super::humantime_serde")]
    pub keepalive_timeout: Duration,
    /// TLS settings; plaintext when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    /// Health checks of cached channels before they are handed out again.
    #[serde(default)]
    pub health_probe: HealthProbeConfig,
}

#[bon::bon]
impl DialConfig {
    /// Creates a dial configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any duration is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_connect_timeout())] connect_timeout: Duration,
        timeout: Option<Duration>,
        #[builder(default = default_keepalive_interval())] keepalive_interval: Duration,
        #[builder(default = default_keepalive_timeout())] keepalive_timeout: Duration,
        tls: Option<TlsConfig>,
        #[builder(default)] health_probe: HealthProbeConfig,
    ) -> Result<Self, ConfigError> {
        let config =
            Self { connect_timeout, timeout, keepalive_interval, keepalive_timeout, tls, health_probe };
        config.validate()?;
        Ok(config)
    }
}

impl DialConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "dial.connect_timeout must be > 0".to_string(),
            });
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Validation {
                message: "dial.timeout must be > 0 when set".to_string(),
            });
        }
        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::Validation {
                message: "dial.keepalive_interval must be > 0".to_string(),
            });
        }
        if self.keepalive_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "dial.keepalive_timeout must be > 0".to_string(),
            });
        }
        self.health_probe.validate()
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            timeout: None,
            keepalive_interval: default_keepalive_interval(),
            keepalive_timeout: default_keepalive_timeout(),
            tls: None,
            health_probe: HealthProbeConfig::default(),
        }
    }
}

/// Active `grpc.health.v1` checks of cached channels.
///
/// When enabled, a cached channel whose last check is older than `interval`
/// is checked on its next lookup and evicted if it is not serving.
/// Services without a health endpoint count as healthy while they answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbeConfig {
    /// Whether cached channels are checked at all.
    #[serde(default = "default_probe_enabled")]
    pub enabled: bool,
    /// Minimum time between two checks of the same channel.
    #[serde(default = "default_probe_interval", with = "super::humantime_serde")]
    pub interval: Duration,
    /// Upper bound for one check.
    #[serde(default = "default_probe_timeout", with = "super::humantime_serde")]
    pub timeout: Duration,
}

impl HealthProbeConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if an enabled probe has a zero
    /// interval or timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Validation {
                message: "dial.health_probe.interval must be > 0".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "dial.health_probe.timeout must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for HealthProbeConfig {
    fn default() -> Self {
        Self {
            enabled: default_probe_enabled(),
            interval: default_probe_interval(),
            timeout: default_probe_timeout(),
        }
    }
}

/// TLS settings for dialing services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM file with the CA that signs service certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,
    /// Domain name expected in service certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_valid() {
        let config = DialConfig::builder().build().unwrap();
        assert_eq!(config, DialConfig::default());
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let err = DialConfig::builder().connect_timeout(Duration::ZERO).build().unwrap_err();
        assert!(err.to_string().contains("connect_timeout"));
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let result = DialConfig::builder().timeout(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn health_probe_is_enabled_by_default() {
        let probe = DialConfig::default().health_probe;
        assert!(probe.enabled);
        assert_eq!(probe.interval, Duration::from_secs(30));
        assert_eq!(probe.timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_probe_interval_is_rejected_only_when_enabled() {
        let mut probe = HealthProbeConfig { interval: Duration::ZERO, ..HealthProbeConfig::default() };
        let err = DialConfig::builder().health_probe(probe.clone()).build().unwrap_err();
        assert!(err.to_string().contains("health_probe.interval"));

        probe.enabled = false;
        assert!(DialConfig::builder().health_probe(probe).build().is_ok());
    }
}
