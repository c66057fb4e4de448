//! Discovery backend abstraction.
//!
//! Callers program against [`ServiceDiscovery`] so a static backend and a
//! registry-backed one are interchangeable. The backend is chosen once, from
//! configuration, by [`connect_discovery`].
//!
//! The direct backend has no external registry, so every registry-lifecycle
//! operation succeeds without doing anything.

use std::{collections::BTreeMap, sync::Arc};

use meshlink_types::{
    Address, ServiceName,
    config::{BackendKind, MeshConfig},
};

use crate::{
    channel::ServiceChannel,
    config::RegistryConfig,
    context::DialContext,
    error::{ConnError, Result},
    options::DialOption,
    registry::DirectRegistry,
};

/// Service discovery and connection capability.
#[tonic::async_trait]
pub trait ServiceDiscovery: Send + Sync + std::fmt::Debug {
    /// Publishes this process as an instance of `service`.
    async fn register(&self, service: &str, address: &Address) -> Result<()>;

    /// Withdraws this process as an instance of `service`.
    async fn unregister(&self, service: &str) -> Result<()>;

    /// Creates the registry's root nodes for the given services.
    async fn create_root_nodes(&self, services: &[ServiceName]) -> Result<()>;

    /// Publishes a configuration document under `key`.
    async fn register_config(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetches a configuration document published under `key`.
    async fn get_config(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// The gateway host that owns `user_id` under hash-based routing.
    ///
    /// `None` when the backend does not shard users across gateways.
    async fn user_gateway_host(&self, user_id: &str) -> Result<Option<String>>;

    /// One load-balanced channel for the service.
    async fn get_conn(
        &self,
        ctx: &DialContext,
        service: &str,
        extra: &[DialOption],
    ) -> Result<ServiceChannel>;

    /// One channel per instance of the service.
    async fn get_conns(
        &self,
        ctx: &DialContext,
        service: &str,
        extra: &[DialOption],
    ) -> Result<Vec<ServiceChannel>>;

    /// Appends default dial options for future dials.
    fn add_option(&self, options: Vec<DialOption>);

    /// Closes a channel and drops it from any cache.
    fn close_conn(&self, channel: &ServiceChannel);

    /// The address this process advertises for itself.
    fn self_conn_target(&self) -> Option<Address>;

    /// Snapshot of cached channels per service.
    fn local_conns(&self) -> BTreeMap<ServiceName, Vec<ServiceChannel>>;

    /// Releases registry sessions held by the backend.
    async fn close(&self) -> Result<()>;
}

#[tonic::async_trait]
impl ServiceDiscovery for DirectRegistry {
    async fn register(&self, service: &str, address: &Address) -> Result<()> {
        tracing::trace!(service, %address, "register is a no-op for the direct backend");
        Ok(())
    }

    async fn unregister(&self, _service: &str) -> Result<()> {
        Ok(())
    }

    async fn create_root_nodes(&self, _services: &[ServiceName]) -> Result<()> {
        Ok(())
    }

    async fn register_config(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn get_config(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn user_gateway_host(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn get_conn(
        &self,
        ctx: &DialContext,
        service: &str,
        extra: &[DialOption],
    ) -> Result<ServiceChannel> {
        DirectRegistry::get_conn(self, ctx, service, extra).await
    }

    async fn get_conns(
        &self,
        ctx: &DialContext,
        service: &str,
        extra: &[DialOption],
    ) -> Result<Vec<ServiceChannel>> {
        DirectRegistry::get_conns(self, ctx, service, extra).await
    }

    fn add_option(&self, options: Vec<DialOption>) {
        DirectRegistry::add_option(self, options);
    }

    fn close_conn(&self, channel: &ServiceChannel) {
        DirectRegistry::close_conn(self, channel);
    }

    fn self_conn_target(&self) -> Option<Address> {
        DirectRegistry::self_conn_target(self).cloned()
    }

    fn local_conns(&self) -> BTreeMap<ServiceName, Vec<ServiceChannel>> {
        DirectRegistry::local_conns(self)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds the discovery backend selected by `config.discovery.backend`.
///
/// # Errors
///
/// Returns [`ConnError::Config`] if the configuration is invalid or names a
/// backend this build does not provide.
pub fn connect_discovery(config: &MeshConfig) -> Result<Arc<dyn ServiceDiscovery>> {
    match config.discovery.backend {
        BackendKind::Direct => {
            let registry = DirectRegistry::new(RegistryConfig::from_mesh_config(config)?);
            Ok(Arc::new(registry))
        },
        other => Err(ConnError::Config { message: format!("unsupported discovery backend {other:?}") }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use meshlink_test_utils::TestServer;

    use super::*;

    fn mesh_config() -> MeshConfig {
        toml::from_str(
            r#"
            [rpc]
            listen_ip = "127.0.0.1"
            advertise_addr = "127.0.0.1:10110"

            [rpc.services]
            user = [10110]
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn direct_backend_lifecycle_operations_are_noops() {
        let discovery = connect_discovery(&mesh_config()).unwrap();

        discovery.register("user", &Address::new("127.0.0.1", 10110)).await.unwrap();
        discovery.unregister("user").await.unwrap();
        discovery.create_root_nodes(&[ServiceName::new("user")]).await.unwrap();
        discovery.register_config("gateway", b"{}").await.unwrap();
        assert_eq!(discovery.get_config("gateway").await.unwrap(), None);
        assert_eq!(discovery.user_gateway_host("u-1001").await.unwrap(), None);
        discovery.close().await.unwrap();
    }

    #[tokio::test]
    async fn direct_backend_reports_self_target() {
        let discovery = connect_discovery(&mesh_config()).unwrap();
        assert_eq!(discovery.self_conn_target(), Some(Address::new("127.0.0.1", 10110)));
        assert!(discovery.local_conns().is_empty());
    }

    #[tokio::test]
    async fn unknown_service_through_trait_object() {
        let discovery = connect_discovery(&mesh_config()).unwrap();
        let err = discovery.get_conn(&DialContext::background(), "nobody", &[]).await.unwrap_err();
        assert!(matches!(err, ConnError::UnknownService { .. }));
    }

    #[tokio::test]
    async fn configured_health_probe_redials_after_server_death() {
        let server = TestServer::start().await.unwrap();
        let port = server.port();
        let config: MeshConfig = toml::from_str(&format!(
            r#"
            [rpc.services]
            user = [{port}]

            [dial.health_probe]
            interval = "50ms"
            timeout = "500ms"
            "#
        ))
        .unwrap();
        let discovery = connect_discovery(&config).unwrap();

        let first = discovery.get_conns(&DialContext::background(), "user", &[]).await.unwrap();
        drop(server);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let err = discovery.get_conns(&DialContext::background(), "user", &[]).await.unwrap_err();
        assert!(matches!(err, ConnError::NoConnectionsEstablished { .. }));
        assert!(first[0].is_broken());
        assert!(discovery.local_conns().is_empty());

        let _restarted = TestServer::start_on_port(port).await.unwrap();
        let second = discovery.get_conns(&DialContext::background(), "user", &[]).await.unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = mesh_config();
        config.rpc.services.insert("empty".to_owned(), Vec::new());
        assert!(matches!(connect_discovery(&config), Err(ConnError::Config { .. })));
    }
}
