//! Channel establishment.
//!
//! The registry never talks to tonic directly: it asks a [`Dialer`] for a
//! channel. [`TonicDialer`] is the production implementation; tests wrap it
//! to count or fail dials.

use std::fmt;

use snafu::ResultExt;
use tonic::transport::Channel;

use crate::{
    error::{DialError, ResolveSnafu, TransportSnafu},
    options::DialSettings,
    resolver::{DialTarget, resolve_target},
};

/// Establishes tonic channels for dial targets.
#[tonic::async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    /// Dials `target` with the given settings.
    ///
    /// # Errors
    ///
    /// Returns a [`DialError`] if the target cannot be resolved or the
    /// transport cannot be set up.
    async fn dial(&self, target: &DialTarget, settings: &DialSettings) -> Result<Channel, DialError>;
}

/// Dials through tonic.
///
/// - `Direct` targets connect eagerly to their one address, so an
///   unreachable address fails the dial.
/// - `Resolved` targets are resolved through the scheme registry and handed
///   to tonic's balancer. Those channels connect lazily; only resolution and
///   endpoint construction can fail here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TonicDialer;

#[tonic::async_trait]
impl Dialer for TonicDialer {
    async fn dial(&self, target: &DialTarget, settings: &DialSettings) -> Result<Channel, DialError> {
        match target {
            DialTarget::Direct(address) => {
                let endpoint = settings.endpoint(address).context(TransportSnafu)?;
                endpoint.connect().await.context(TransportSnafu)
            },
            DialTarget::Resolved { .. } => {
                let addresses = resolve_target(target).context(ResolveSnafu)?;
                let endpoints = addresses
                    .iter()
                    .map(|address| settings.endpoint(address))
                    .collect::<Result<Vec<_>, _>>()
                    .context(TransportSnafu)?;
                Ok(Channel::balance_list(endpoints.into_iter()))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use meshlink_test_utils::{TestServer, closed_port};
    use meshlink_types::Address;

    use super::*;
    use crate::resolver::DirectResolver;

    #[tokio::test]
    async fn direct_target_connects_to_live_server() {
        let server = TestServer::start().await.unwrap();
        let target = DialTarget::Direct(server.address());

        assert!(TonicDialer.dial(&target, &DialSettings::default()).await.is_ok());
    }

    #[tokio::test]
    async fn direct_target_fails_for_closed_port() {
        let target = DialTarget::Direct(closed_port());

        let err = TonicDialer.dial(&target, &DialSettings::default()).await.unwrap_err();
        assert!(matches!(err, DialError::Transport { .. }));
    }

    #[tokio::test]
    async fn resolved_target_requires_registered_scheme() {
        let target: DialTarget = "unregistered:///127.0.0.1:1".parse().unwrap();

        let err = TonicDialer.dial(&target, &DialSettings::default()).await.unwrap_err();
        assert!(matches!(err, DialError::Resolve { .. }));
    }

    #[tokio::test]
    async fn direct_list_target_builds_balanced_channel() {
        DirectResolver::register_once();
        let target = DialTarget::direct_list(&[
            Address::new("127.0.0.1", 2001),
            Address::new("127.0.0.1", 2002),
        ]);

        assert!(TonicDialer.dial(&target, &DialSettings::default()).await.is_ok());
    }
}
