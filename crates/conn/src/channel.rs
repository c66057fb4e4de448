//! Cached channel handles.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use meshlink_types::{Address, ServiceName};
use parking_lot::Mutex;
use tonic::{service::interceptor::InterceptedService, transport::Channel};

use crate::{interceptor::MetadataInterceptor, options::DialOption};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// How a channel was established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialMode {
    /// One channel balancing across every address of the service.
    Balanced,
    /// One channel bound to a single address of a fan-out.
    Direct(Address),
}

/// Lifecycle state shared by every clone of a handle.
#[derive(Debug)]
struct ChannelState {
    closed: AtomicBool,
    broken: AtomicBool,
    last_probe: Mutex<Option<Instant>>,
}

/// A cached connection handle for one service.
///
/// Cloning is cheap and every clone shares the underlying tonic channel and
/// lifecycle state. Two handles are equal only when they come from the same
/// dial.
#[derive(Clone)]
pub struct ServiceChannel {
    id: u64,
    service: ServiceName,
    target: String,
    mode: DialMode,
    options: Arc<[DialOption]>,
    channel: Channel,
    interceptor: MetadataInterceptor,
    state: Arc<ChannelState>,
}

impl ServiceChannel {
    pub(crate) fn new(
        service: ServiceName,
        target: String,
        mode: DialMode,
        options: Vec<DialOption>,
        channel: Channel,
        interceptor: MetadataInterceptor,
    ) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            service,
            target,
            mode,
            options: options.into(),
            channel,
            interceptor,
            state: Arc::new(ChannelState {
                closed: AtomicBool::new(false),
                broken: AtomicBool::new(false),
                last_probe: Mutex::new(Some(Instant::now())),
            }),
        }
    }

    /// Process-unique handle id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The service this channel connects to.
    #[must_use]
    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// The dial target, `scheme:///endpoint` or `host:port`.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// How the channel was established.
    #[must_use]
    pub fn mode(&self) -> &DialMode {
        &self.mode
    }

    /// The effective options the channel was dialed with, in order.
    #[must_use]
    pub fn options(&self) -> &[DialOption] {
        &self.options
    }

    /// The underlying tonic channel.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// The interceptor carrying this channel's metadata options.
    #[must_use]
    pub fn interceptor(&self) -> MetadataInterceptor {
        self.interceptor.clone()
    }

    /// The channel wrapped with its metadata interceptor, ready for a
    /// generated client's `new`.
    #[must_use]
    pub fn intercepted(&self) -> InterceptedService<Channel, MetadataInterceptor> {
        InterceptedService::new(self.channel(), self.interceptor())
    }

    /// Marks the channel as failed so the next registry access evicts it.
    pub fn mark_broken(&self) {
        self.state.broken.store(true, Ordering::Release);
    }

    /// Returns true once the channel has been closed through the registry.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Returns true once the channel has been reported or probed as failed.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.state.broken.load(Ordering::Acquire)
    }

    /// Neither closed nor broken.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.is_closed() && !self.is_broken()
    }

    /// Marks the channel closed. Returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        !self.state.closed.swap(true, Ordering::AcqRel)
    }

    /// Returns true when the last probe is older than `interval`.
    pub(crate) fn probe_due(&self, interval: Duration) -> bool {
        self.state.last_probe.lock().is_none_or(|at| at.elapsed() >= interval)
    }

    pub(crate) fn record_probe(&self) {
        *self.state.last_probe.lock() = Some(Instant::now());
    }
}

impl PartialEq for ServiceChannel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceChannel {}

impl fmt::Debug for ServiceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceChannel")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("target", &self.target)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}
