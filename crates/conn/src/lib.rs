//! Static service-connection layer for a tonic gRPC mesh.
//!
//! Given a service name from a config-declared topology, this crate resolves
//! its addresses and hands back cached tonic channels. There is no external
//! registry: every service listens on one shared IP with one or more ports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ServiceDiscovery (backend-neutral)             │
//! │  get_conn │ get_conns │ add_option │ close_conn │ no-ops    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   DirectRegistry                            │
//! │  Per-service lock │ Balanced + direct cache │ Eviction      │
//! ├─────────────────────────────────────────────────────────────┤
//! │        AddressBook            │      Resolver schemes       │
//! │  name → [listen_ip:port]      │  direct:///a,b → [a, b]     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Dialer (tonic)                            │
//! │  Endpoint::connect │ Channel::balance_list                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use meshlink_conn::{DialContext, DirectRegistry, RegistryConfig};
//! use meshlink_types::ServiceTopology;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let topology = ServiceTopology::new("127.0.0.1", [("push", vec![10170, 10171])])?;
//! let registry = DirectRegistry::new(RegistryConfig::builder().topology(topology).build()?);
//!
//! let ctx = DialContext::background();
//! let balanced = registry.get_conn(&ctx, "push", &[]).await?;
//! let per_instance = registry.get_conns(&ctx, "push", &[]).await?;
//! assert_eq!(per_instance.len(), 2);
//! # drop(balanced);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod address_book;
mod channel;
mod config;
mod context;
mod dialer;
mod discovery;
mod error;
mod health;
mod interceptor;
mod metrics;
mod options;
mod registry;
pub mod resolver;

pub use address_book::AddressBook;
pub use channel::{DialMode, ServiceChannel};
pub use config::RegistryConfig;
pub use context::DialContext;
pub use dialer::{Dialer, TonicDialer};
pub use discovery::{ServiceDiscovery, connect_discovery};
pub use error::{AddressFailure, ConnError, DialError, Result};
pub use health::{ChannelProbe, GrpcHealthProbe};
pub use interceptor::MetadataInterceptor;
pub use metrics::{ConnMetrics, EvictionReason, MetricsConnMetrics, NoopConnMetrics};
pub use options::{
    DialOption, DialSettings, MetadataEntry, TransportSecurity, default_options,
    options_from_config,
};
pub use registry::DirectRegistry;
pub use resolver::{DialTarget, DirectResolver, ResolveError, Resolver};
