//! Active health probing of cached channels.

use std::{fmt, time::Duration};

use tonic::Code;

use tonic_health::pb::{
    HealthCheckRequest, health_check_response::ServingStatus, health_client::HealthClient,
};

use crate::channel::ServiceChannel;

/// Default upper bound for a single probe.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides whether a cached channel is still healthy.
#[tonic::async_trait]
pub trait ChannelProbe: Send + Sync + fmt::Debug {
    /// Returns true if the channel can keep serving calls.
    async fn probe(&self, channel: &ServiceChannel) -> bool;
}

/// Probe using the standard `grpc.health.v1.Health/Check` RPC.
///
/// `SERVING` is healthy, and so is a server that answers `UNIMPLEMENTED`
/// because it has no health service. Any other status, an RPC error, or a
/// timeout is unhealthy.
#[derive(Debug, Clone)]
pub struct GrpcHealthProbe {
    timeout: Duration,
    service: String,
}

impl GrpcHealthProbe {
    /// Probe of the server's overall health (empty service name).
    #[must_use]
    pub fn new() -> Self {
        Self { timeout: DEFAULT_PROBE_TIMEOUT, service: String::new() }
    }

    /// Sets the probe timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks a named service instead of the server as a whole.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

impl Default for GrpcHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[tonic::async_trait]
impl ChannelProbe for GrpcHealthProbe {
    async fn probe(&self, channel: &ServiceChannel) -> bool {
        let mut client = HealthClient::new(channel.intercepted());
        let request = HealthCheckRequest { service: self.service.clone() };

        match tokio::time::timeout(self.timeout, client.check(request)).await {
            Ok(Ok(response)) => response.into_inner().status == ServingStatus::Serving as i32,
            // The server answered but exposes no health service.
            Ok(Err(status)) if status.code() == Code::Unimplemented => true,
            Ok(Err(status)) => {
                tracing::debug!(
                    service = %channel.service(),
                    target = channel.target(),
                    code = ?status.code(),
                    "health probe failed"
                );
                false
            },
            Err(_) => {
                tracing::debug!(
                    service = %channel.service(),
                    target = channel.target(),
                    timeout_ms = self.timeout.as_millis(),
                    "health probe timed out"
                );
                false
            },
        }
    }
}
