//! The connection registry.
//!
//! [`DirectRegistry`] turns service names from the static topology into
//! cached tonic channels. Two acquisition policies are kept apart:
//!
//! - [`get_conn`](DirectRegistry::get_conn) dials once through the `direct`
//!   resolver scheme and lets tonic's balancer spread calls over every address.
//! - [`get_conns`](DirectRegistry::get_conns) dials each address on its own
//!   and returns one channel per address, in address order.
//!
//! Each policy has its own cache slot per service, so neither call path ever
//! returns the other's channel shape.
//!
//! # Concurrency
//!
//! The cache and the option list sit behind `parking_lot` locks that are
//! never held across an await. A per-service async mutex is held across
//! check-cache → dial → publish, so concurrent cold-start callers for the
//! same service produce exactly one dial.
//!
//! # Eviction
//!
//! Every cache access validates the entry first. Closed or broken channels are
//! evicted, and with a [`ChannelProbe`](crate::ChannelProbe) configured,
//! channels whose last probe is older than the probe interval are probed and
//! evicted on failure. The next call then re-dials.

use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::join_all;
use meshlink_types::{Address, ServiceName};
use parking_lot::RwLock;
use snafu::ResultExt;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    address_book::AddressBook,
    channel::{DialMode, ServiceChannel},
    config::RegistryConfig,
    context::DialContext,
    dialer::Dialer,
    error::{AddressFailure, ConnError, DialError, DialSnafu, Result},
    health::ChannelProbe,
    interceptor::MetadataInterceptor,
    metrics::{ConnMetrics, EvictionReason},
    options::{DialOption, DialSettings, TransportSecurity, default_options},
    resolver::{DialTarget, DirectResolver},
};

/// Cached channels for one service.
#[derive(Debug, Default, Clone)]
struct CacheEntry {
    balanced: Option<ServiceChannel>,
    direct: Vec<ServiceChannel>,
}

impl CacheEntry {
    fn remove(&mut self, channel: &ServiceChannel) -> bool {
        if self.balanced.as_ref() == Some(channel) {
            self.balanced = None;
            return true;
        }
        let before = self.direct.len();
        self.direct.retain(|cached| cached != channel);
        self.direct.len() != before
    }

    fn is_empty(&self) -> bool {
        self.balanced.is_none() && self.direct.is_empty()
    }

    fn channels(&self) -> impl Iterator<Item = &ServiceChannel> {
        self.balanced.iter().chain(self.direct.iter())
    }
}

struct Inner {
    book: AddressBook,
    security: TransportSecurity,
    options: RwLock<Vec<DialOption>>,
    self_address: Option<Address>,
    probe: Option<Arc<dyn ChannelProbe>>,
    probe_interval: Duration,
    metrics: Arc<dyn ConnMetrics>,
    dialer: Arc<dyn Dialer>,
    cache: RwLock<BTreeMap<ServiceName, CacheEntry>>,
    locks: BTreeMap<ServiceName, AsyncMutex<()>>,
}

/// Connection registry over a static service topology.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct DirectRegistry {
    inner: Arc<Inner>,
}

impl DirectRegistry {
    /// Creates a registry and registers the `direct` resolver scheme.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        DirectResolver::register_once();

        let RegistryConfig {
            topology,
            security,
            default_options: configured,
            self_address,
            probe,
            probe_interval,
            metrics,
            dialer,
        } = config;

        let locks = topology.services().map(|name| (name.clone(), AsyncMutex::new(()))).collect();
        let mut options = default_options();
        options.extend(configured);

        tracing::debug!(
            services = topology.len(),
            tls = security.is_tls(),
            probing = probe.is_some(),
            "created connection registry"
        );

        Self {
            inner: Arc::new(Inner {
                book: AddressBook::new(topology),
                security,
                options: RwLock::new(options),
                self_address,
                probe,
                probe_interval,
                metrics,
                dialer,
                cache: RwLock::new(BTreeMap::new()),
                locks,
            }),
        }
    }

    /// The address book backing this registry.
    #[must_use]
    pub fn address_book(&self) -> &AddressBook {
        &self.inner.book
    }

    /// Returns one load-balanced channel for the service.
    ///
    /// A cached usable channel is returned without dialing. Otherwise the
    /// service's addresses are joined into a `direct:///a,b,...` target and
    /// dialed once; the result is cached.
    ///
    /// # Errors
    ///
    /// - [`ConnError::UnknownService`] if the name is not in the topology (no dial happens)
    /// - [`ConnError::Dial`] if the target cannot be resolved or dialed
    /// - [`ConnError::Cancelled`] / [`ConnError::DeadlineExceeded`] from `ctx`
    pub async fn get_conn(
        &self,
        ctx: &DialContext,
        service: &str,
        extra: &[DialOption],
    ) -> Result<ServiceChannel> {
        let (name, lock, addresses) = self.lookup(service)?;

        ctx.run(service, async {
            let _guard = lock.lock().await;

            if let Some(channel) = self.cached_balanced(name).await {
                self.inner.metrics.record_cache_lookup(service, true);
                tracing::debug!(service, channel_id = channel.id(), "balanced channel cache hit");
                return Ok(channel);
            }
            self.inner.metrics.record_cache_lookup(service, false);

            let target = DialTarget::direct_list(&addresses);
            let settings = self.settings(extra);
            let channel = self
                .dial(name, target.clone(), DialMode::Balanced, &settings)
                .await
                .context(DialSnafu { service, target: target.to_string() })?;

            self.inner.cache.write().entry(name.clone()).or_default().balanced =
                Some(channel.clone());
            Ok(channel)
        })
        .await
    }

    /// Returns one channel per address of the service, in address order.
    ///
    /// A cached set is returned without dialing when it still holds one
    /// usable channel for every current address. Otherwise it is evicted and
    /// every address is dialed concurrently. Nothing is cached unless every
    /// dial succeeds.
    ///
    /// # Errors
    ///
    /// - [`ConnError::UnknownService`] if the name is not in the topology (no dial happens)
    /// - [`ConnError::NoConnectionsEstablished`] if every dial failed, naming each address
    /// - [`ConnError::Dial`] naming the first failed address if only some failed
    /// - [`ConnError::Cancelled`] / [`ConnError::DeadlineExceeded`] from `ctx`
    pub async fn get_conns(
        &self,
        ctx: &DialContext,
        service: &str,
        extra: &[DialOption],
    ) -> Result<Vec<ServiceChannel>> {
        let (name, lock, addresses) = self.lookup(service)?;

        ctx.run(service, async {
            let _guard = lock.lock().await;

            if let Some(channels) = self.cached_direct(name, &addresses).await {
                self.inner.metrics.record_cache_lookup(service, true);
                tracing::debug!(service, count = channels.len(), "direct channel set cache hit");
                return Ok(channels);
            }
            self.inner.metrics.record_cache_lookup(service, false);

            let settings = self.settings(extra);
            let results = join_all(addresses.iter().map(|address| {
                self.dial(
                    name,
                    DialTarget::Direct(address.clone()),
                    DialMode::Direct(address.clone()),
                    &settings,
                )
            }))
            .await;

            let mut channels = Vec::with_capacity(addresses.len());
            let mut failures = Vec::new();
            for (address, result) in addresses.iter().zip(results) {
                match result {
                    Ok(channel) => channels.push(channel),
                    Err(error) => failures.push(AddressFailure { address: address.clone(), error }),
                }
            }

            if channels.is_empty() {
                return Err(ConnError::NoConnectionsEstablished {
                    service: service.to_owned(),
                    failures,
                });
            }
            if let Some(failure) = failures.into_iter().next() {
                tracing::warn!(
                    service,
                    connected = channels.len(),
                    expected = addresses.len(),
                    "partial fan-out, discarding established channels"
                );
                return Err(failure.error)
                    .context(DialSnafu { service, target: failure.address.to_string() });
            }

            self.inner.cache.write().entry(name.clone()).or_default().direct = channels.clone();
            Ok(channels)
        })
        .await
    }

    /// Appends options to the default list applied to every future dial.
    ///
    /// Channels that are already established keep the options they were
    /// dialed with.
    pub fn add_option(&self, options: impl IntoIterator<Item = DialOption>) {
        let mut current = self.inner.options.write();
        let before = current.len();
        current.extend(options);
        tracing::debug!(added = current.len() - before, total = current.len(), "added dial options");
    }

    /// Snapshot of the default options applied to every future dial.
    #[must_use]
    pub fn options(&self) -> Vec<DialOption> {
        self.inner.options.read().clone()
    }

    /// Closes a channel and removes it from the cache.
    ///
    /// Idempotent. Transport resources are released once the last clone of
    /// the handle is dropped.
    pub fn close_conn(&self, channel: &ServiceChannel) {
        let newly_closed = channel.close();
        let removed = self.evict(channel.service(), channel, EvictionReason::Closed);
        if newly_closed {
            tracing::debug!(
                service = %channel.service(),
                channel_id = channel.id(),
                removed,
                "closed channel"
            );
        }
    }

    /// The address this process advertises for itself.
    #[must_use]
    pub fn self_conn_target(&self) -> Option<&Address> {
        self.inner.self_address.as_ref()
    }

    /// Evicts every cached channel of a service. Returns how many were removed.
    pub fn invalidate(&self, service: &str) -> usize {
        let Some(entry) = self.inner.cache.write().remove(service) else {
            return 0;
        };
        let count = entry.channels().count();
        for _ in entry.channels() {
            self.inner.metrics.record_eviction(service, EvictionReason::Invalidated);
        }
        tracing::info!(service, count, "invalidated cached channels");
        count
    }

    /// Snapshot of every cached channel, balanced channel first per service.
    #[must_use]
    pub fn local_conns(&self) -> BTreeMap<ServiceName, Vec<ServiceChannel>> {
        self.inner
            .cache
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.channels().cloned().collect()))
            .collect()
    }

    fn lookup(&self, service: &str) -> Result<(&ServiceName, &AsyncMutex<()>, Vec<Address>)> {
        let addresses = self.inner.book.resolve(service)?;
        let (name, lock) = self
            .inner
            .locks
            .get_key_value(service)
            .ok_or_else(|| ConnError::UnknownService { service: service.to_owned() })?;
        Ok((name, lock, addresses))
    }

    fn settings(&self, extra: &[DialOption]) -> DialSettings {
        let mut options = self.inner.options.read().clone();
        options.extend_from_slice(extra);
        DialSettings { options, security: self.inner.security.clone() }
    }

    async fn dial(
        &self,
        service: &ServiceName,
        target: DialTarget,
        mode: DialMode,
        settings: &DialSettings,
    ) -> std::result::Result<ServiceChannel, DialError> {
        let mode_label = match mode {
            DialMode::Balanced => "balanced",
            DialMode::Direct(_) => "direct",
        };

        let started = Instant::now();
        let result = self.inner.dialer.dial(&target, settings).await;
        self.inner.metrics.record_dial(
            service.as_str(),
            mode_label,
            started.elapsed(),
            result.is_ok(),
        );

        match result {
            Ok(channel) => {
                tracing::info!(service = %service, target = %target, mode = mode_label, "dialed service");
                Ok(ServiceChannel::new(
                    service.clone(),
                    target.to_string(),
                    mode,
                    settings.options.clone(),
                    channel,
                    MetadataInterceptor::new(settings),
                ))
            },
            Err(error) => {
                tracing::warn!(
                    service = %service,
                    target = %target,
                    mode = mode_label,
                    error = %error,
                    "dial failed"
                );
                Err(error)
            },
        }
    }

    async fn cached_balanced(&self, name: &ServiceName) -> Option<ServiceChannel> {
        let cached = self.inner.cache.read().get(name).and_then(|entry| entry.balanced.clone())?;
        if let Some(reason) = self.check(&cached).await {
            self.evict(name, &cached, reason);
            return None;
        }
        Some(cached)
    }

    async fn cached_direct(
        &self,
        name: &ServiceName,
        addresses: &[Address],
    ) -> Option<Vec<ServiceChannel>> {
        let cached =
            self.inner.cache.read().get(name).map(|entry| entry.direct.clone()).unwrap_or_default();
        if cached.is_empty() {
            return None;
        }

        let complete = cached.len() == addresses.len()
            && cached
                .iter()
                .zip(addresses)
                .all(|(channel, address)| matches!(channel.mode(), DialMode::Direct(a) if a == address));
        if !complete {
            self.evict_direct(name, EvictionReason::Incomplete);
            return None;
        }

        for channel in &cached {
            if let Some(reason) = self.check(channel).await {
                self.evict_direct(name, reason);
                return None;
            }
        }
        Some(cached)
    }

    /// Returns why a cached channel must not be reused, if it must not.
    async fn check(&self, channel: &ServiceChannel) -> Option<EvictionReason> {
        if channel.is_closed() {
            return Some(EvictionReason::Closed);
        }
        if channel.is_broken() {
            return Some(EvictionReason::Broken);
        }

        let probe = self.inner.probe.as_ref()?;
        if !channel.probe_due(self.inner.probe_interval) {
            return None;
        }
        let healthy = probe.probe(channel).await;
        channel.record_probe();
        if healthy {
            None
        } else {
            channel.mark_broken();
            Some(EvictionReason::ProbeFailed)
        }
    }

    fn evict(&self, name: &ServiceName, channel: &ServiceChannel, reason: EvictionReason) -> bool {
        let removed = {
            let mut cache = self.inner.cache.write();
            let Some(entry) = cache.get_mut(name) else {
                return false;
            };
            let removed = entry.remove(channel);
            if entry.is_empty() {
                cache.remove(name);
            }
            removed
        };

        if removed {
            self.inner.metrics.record_eviction(name.as_str(), reason);
            tracing::warn!(
                service = %name,
                channel_id = channel.id(),
                target = channel.target(),
                reason = %reason,
                "evicted cached channel"
            );
        }
        removed
    }

    fn evict_direct(&self, name: &ServiceName, reason: EvictionReason) {
        let evicted = {
            let mut cache = self.inner.cache.write();
            let Some(entry) = cache.get_mut(name) else {
                return;
            };
            let evicted = std::mem::take(&mut entry.direct);
            if entry.is_empty() {
                cache.remove(name);
            }
            evicted
        };

        for _ in &evicted {
            self.inner.metrics.record_eviction(name.as_str(), reason);
        }
        tracing::warn!(service = %name, count = evicted.len(), reason = %reason, "evicted direct channel set");
    }
}

impl fmt::Debug for DirectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectRegistry")
            .field("services", &self.inner.book.topology().len())
            .field("cached", &self.inner.cache.read().len())
            .field("self_address", &self.inner.self_address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use meshlink_types::ServiceTopology;
    use tonic::transport::Endpoint;

    use super::*;

    fn handle(service: &str, mode: DialMode) -> ServiceChannel {
        ServiceChannel::new(
            ServiceName::new(service),
            "127.0.0.1:1".to_owned(),
            mode,
            Vec::new(),
            Endpoint::from_static("http://127.0.0.1:1").connect_lazy(),
            MetadataInterceptor::default(),
        )
    }

    fn registry() -> DirectRegistry {
        let topology = ServiceTopology::new("127.0.0.1", [("svc", vec![1])]).unwrap();
        DirectRegistry::new(RegistryConfig::builder().topology(topology).build().unwrap())
    }

    #[tokio::test]
    async fn cache_entry_removes_by_identity() {
        let balanced = handle("svc", DialMode::Balanced);
        let direct = handle("svc", DialMode::Direct(Address::new("127.0.0.1", 1)));
        let mut entry = CacheEntry { balanced: Some(balanced.clone()), direct: vec![direct.clone()] };

        assert_eq!(entry.channels().count(), 2);
        assert!(entry.remove(&balanced));
        assert!(!entry.remove(&balanced));
        assert!(entry.remove(&direct));
        assert!(entry.is_empty());
    }

    #[tokio::test]
    async fn new_registry_starts_with_builtin_defaults() {
        let registry = registry();
        assert_eq!(registry.options(), default_options());
        assert!(registry.local_conns().is_empty());
        assert!(registry.self_conn_target().is_none());
    }

    #[tokio::test]
    async fn invalidate_unknown_or_empty_service_removes_nothing() {
        let registry = registry();
        assert_eq!(registry.invalidate("svc"), 0);
        assert_eq!(registry.invalidate("missing"), 0);
    }

    #[tokio::test]
    async fn close_conn_on_uncached_handle_only_marks_it_closed() {
        let registry = registry();
        let channel = handle("svc", DialMode::Balanced);
        registry.close_conn(&channel);
        registry.close_conn(&channel);
        assert!(channel.is_closed());
    }
}
