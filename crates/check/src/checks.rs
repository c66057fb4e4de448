//! Readiness checks and the round loop.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use meshlink_conn::{ConnError, DialContext, DirectRegistry, RegistryConfig};
use meshlink_types::{Address, config::MeshConfig};
use snafu::Snafu;
use tokio::net::TcpStream;

/// Upper bound for one service fan-out check.
const SERVICE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a check did not pass.
#[derive(Debug, Snafu)]
pub enum CheckError {
    /// A component address refused the connection.
    #[snafu(display("component '{name}' unreachable at {address}: {source}"))]
    Unreachable {
        /// Component name.
        name: String,
        /// The address that failed.
        address: Address,
        /// Connect error.
        source: std::io::Error,
    },

    /// A component address did not answer within its timeout.
    #[snafu(display("component '{name}' did not answer at {address} within {timeout_ms}ms"))]
    TimedOut {
        /// Component name.
        name: String,
        /// The address that failed.
        address: Address,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// A mesh service could not be reached on every port.
    #[snafu(display("{source}"))]
    Service {
        /// Registry error naming the service.
        source: ConnError,
    },

    /// Configuration could not be loaded or is invalid.
    #[snafu(display("invalid configuration: {message}"))]
    Config {
        /// Error description.
        message: String,
    },
}

impl CheckError {
    /// Configuration errors never fix themselves between rounds.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::TimedOut { .. } => true,
            Self::Service { source } => source.is_retryable(),
            Self::Config { .. } => false,
        }
    }
}

/// One readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Every address accepts a TCP connection within `timeout`.
    Component {
        /// Component name.
        name: String,
        /// Addresses to connect to.
        addresses: Vec<Address>,
        /// Per-address connect timeout.
        timeout: Duration,
    },
    /// Every port of a mesh service accepts a gRPC connection.
    Service {
        /// Service name from the topology.
        service: String,
    },
}

impl Check {
    /// Human-readable name for logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Component { name, .. } => name,
            Self::Service { service } => service,
        }
    }
}

/// Runs checks in order, round after round.
#[derive(Debug)]
pub struct Checker {
    checks: Vec<Check>,
    registry: Option<DirectRegistry>,
}

impl Checker {
    /// Builds one check per component and, with `services`, one per
    /// topology service.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Config`] if an address or the topology is invalid.
    pub fn from_config(config: &MeshConfig, services: bool) -> Result<Self, CheckError> {
        let mut checks = Vec::with_capacity(config.components.len());
        for component in &config.components {
            let addresses = component
                .parsed_addresses()
                .map_err(|e| CheckError::Config { message: e.to_string() })?;
            checks.push(Check::Component {
                name: component.name.clone(),
                addresses,
                timeout: component.timeout,
            });
        }

        let registry = if services {
            let registry_config = RegistryConfig::from_mesh_config(config)
                .map_err(|e| CheckError::Config { message: e.to_string() })?;
            let registry = DirectRegistry::new(registry_config);
            checks.extend(
                registry
                    .address_book()
                    .services()
                    .map(|name| Check::Service { service: name.to_string() }),
            );
            Some(registry)
        } else {
            None
        };

        Ok(Self { checks, registry })
    }

    /// The checks in run order.
    #[must_use]
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Runs every check once, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error.
    pub async fn run_round(&self) -> Result<(), CheckError> {
        for check in &self.checks {
            match check {
                Check::Component { name, addresses, timeout } => {
                    for address in addresses {
                        check_reachable(name, address, *timeout).await?;
                    }
                },
                Check::Service { service } => self.check_service(service).await?,
            }
            tracing::info!(check = check.name(), "connected successfully");
        }
        Ok(())
    }

    /// Runs rounds until one passes or `max_rounds` rounds have failed,
    /// waiting `interval` between rounds.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Config`] if `max_rounds` is zero, otherwise the
    /// last round's error.
    pub async fn run(&self, max_rounds: usize, interval: Duration) -> Result<(), CheckError> {
        if max_rounds == 0 {
            return Err(CheckError::Config { message: "max_rounds must be at least 1".to_owned() });
        }
        let backoff = ConstantBuilder::default()
            .with_delay(interval)
            .with_max_times(max_rounds.saturating_sub(1));

        (|| self.run_round())
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(CheckError::is_retryable)
            .notify(|err: &CheckError, delay: Duration| {
                tracing::warn!(error = %err, retry_in_ms = delay.as_millis(), "round failed");
            })
            .await
    }

    async fn check_service(&self, service: &str) -> Result<(), CheckError> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        let ctx = DialContext::background().timeout(SERVICE_CHECK_TIMEOUT);
        let channels =
            registry.get_conns(&ctx, service, &[]).await.map_err(|source| CheckError::Service { source })?;
        tracing::debug!(service, instances = channels.len(), "service reachable");
        Ok(())
    }
}

async fn check_reachable(name: &str, address: &Address, timeout: Duration) -> Result<(), CheckError> {
    match tokio::time::timeout(timeout, TcpStream::connect(address.to_string())).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(source)) => {
            Err(CheckError::Unreachable { name: name.to_owned(), address: address.clone(), source })
        },
        Err(_) => Err(CheckError::TimedOut {
            name: name.to_owned(),
            address: address.clone(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
