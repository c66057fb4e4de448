//! Registry configuration.

use std::{sync::Arc, time::Duration};

use meshlink_types::{Address, ServiceTopology, config::MeshConfig};

use crate::{
    dialer::{Dialer, TonicDialer},
    error::{ConnError, Result},
    health::{ChannelProbe, GrpcHealthProbe},
    metrics::{ConnMetrics, default_metrics},
    options::{DialOption, TransportSecurity, options_from_config},
};

/// Default interval between active probes of one cached channel.
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Everything a [`DirectRegistry`](crate::DirectRegistry) is built from.
///
/// # Example
///
/// ```no_run
/// # use meshlink_conn::{RegistryConfig, DialOption};
/// # use meshlink_types::{Address, ServiceTopology};
/// let topology = ServiceTopology::new("127.0.0.1", [("auth", vec![10160])])?;
/// let config = RegistryConfig::builder()
///     .topology(topology)
///     .self_address(Address::new("127.0.0.1", 10110))
///     .default_options(vec![DialOption::TcpNodelay(true)])
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub(crate) topology: ServiceTopology,
    pub(crate) security: TransportSecurity,
    pub(crate) default_options: Vec<DialOption>,
    pub(crate) self_address: Option<Address>,
    pub(crate) probe: Option<Arc<dyn ChannelProbe>>,
    pub(crate) probe_interval: Duration,
    pub(crate) metrics: Arc<dyn ConnMetrics>,
    pub(crate) dialer: Arc<dyn Dialer>,
}

#[bon::bon]
impl RegistryConfig {
    /// Creates a registry configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConnError::Config`] if `probe_interval` is zero.
    #[builder]
    pub fn new(
        topology: ServiceTopology,
        #[builder(default)] security: TransportSecurity,
        #[builder(default)] default_options: Vec<DialOption>,
        self_address: Option<Address>,
        probe: Option<Arc<dyn ChannelProbe>>,
        #[builder(default = DEFAULT_PROBE_INTERVAL)] probe_interval: Duration,
        #[builder(default = default_metrics())] metrics: Arc<dyn ConnMetrics>,
        #[builder(default = Arc::new(TonicDialer))] dialer: Arc<dyn Dialer>,
    ) -> Result<Self> {
        if probe_interval.is_zero() {
            return Err(ConnError::Config { message: "probe_interval must be > 0".to_owned() });
        }
        Ok(Self {
            topology,
            security,
            default_options,
            self_address,
            probe,
            probe_interval,
            metrics,
            dialer,
        })
    }
}

impl RegistryConfig {
    /// Maps validated file configuration onto a registry configuration.
    ///
    /// `dial.health_probe` turns on [`GrpcHealthProbe`] checks of cached
    /// channels.
    ///
    /// # Errors
    ///
    /// Returns [`ConnError::Config`] if the file configuration is invalid or
    /// its CA certificate cannot be read.
    pub fn from_mesh_config(config: &MeshConfig) -> Result<Self> {
        config.validate()?;

        let health = &config.dial.health_probe;
        let probe = health.enabled.then(|| {
            Arc::new(GrpcHealthProbe::new().with_timeout(health.timeout)) as Arc<dyn ChannelProbe>
        });

        Self::builder()
            .topology(config.topology()?)
            .security(TransportSecurity::from_config(config.dial.tls.as_ref())?)
            .default_options(options_from_config(&config.dial))
            .maybe_self_address(config.self_address()?)
            .maybe_probe(probe)
            .maybe_probe_interval(health.enabled.then_some(health.interval))
            .build()
    }

    /// The service topology.
    #[must_use]
    pub fn topology(&self) -> &ServiceTopology {
        &self.topology
    }

    /// Configured default options, applied after the built-in defaults.
    #[must_use]
    pub fn default_options(&self) -> &[DialOption] {
        &self.default_options
    }

    /// This process's advertised address.
    #[must_use]
    pub fn self_address(&self) -> Option<&Address> {
        self.self_address.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn topology() -> ServiceTopology {
        ServiceTopology::new("127.0.0.1", [("auth", vec![10160])]).unwrap()
    }

    #[test]
    fn builder_applies_defaults() {
        let config = RegistryConfig::builder().topology(topology()).build().unwrap();
        assert!(config.default_options().is_empty());
        assert!(config.self_address().is_none());
        assert!(config.probe.is_none());
        assert_eq!(config.probe_interval, DEFAULT_PROBE_INTERVAL);
        assert!(!config.security.is_tls());
    }

    #[test]
    fn zero_probe_interval_is_rejected() {
        let result =
            RegistryConfig::builder().topology(topology()).probe_interval(Duration::ZERO).build();
        assert!(matches!(result, Err(ConnError::Config { .. })));
    }

    #[test]
    fn maps_mesh_config() {
        let mesh: MeshConfig = toml::from_str(
            r#"
            [rpc]
            listen_ip = "10.1.0.4"
            advertise_addr = "10.1.0.4:10110"

            [rpc.services]
            msg = [10130, 10131]

            [dial]
            connect_timeout = "2s"
            timeout = "15s"
            "#,
        )
        .unwrap();

        let config = RegistryConfig::from_mesh_config(&mesh).unwrap();
        assert_eq!(config.topology().ports("msg"), Some(&[10130, 10131][..]));
        assert_eq!(config.self_address(), Some(&Address::new("10.1.0.4", 10110)));
        assert!(config.default_options().contains(&DialOption::Timeout(Duration::from_secs(15))));
        assert!(config.probe.is_some());
        assert_eq!(config.probe_interval, DEFAULT_PROBE_INTERVAL);
    }

    #[test]
    fn health_probe_section_sets_interval() {
        let mesh: MeshConfig = toml::from_str(
            r#"
            [rpc.services]
            msg = [10130]

            [dial.health_probe]
            interval = "250ms"
            timeout = "100ms"
            "#,
        )
        .unwrap();

        let config = RegistryConfig::from_mesh_config(&mesh).unwrap();
        assert!(config.probe.is_some());
        assert_eq!(config.probe_interval, Duration::from_millis(250));
    }

    #[test]
    fn disabled_health_probe_leaves_registry_without_probe() {
        let mesh: MeshConfig = toml::from_str(
            r#"
            [rpc.services]
            msg = [10130]

            [dial.health_probe]
            enabled = false
            interval = "0s"
            "#,
        )
        .unwrap();

        let config = RegistryConfig::from_mesh_config(&mesh).unwrap();
        assert!(config.probe.is_none());
        assert_eq!(config.probe_interval, DEFAULT_PROBE_INTERVAL);
    }
}
