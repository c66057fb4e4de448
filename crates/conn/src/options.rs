//! Dial options and transport security.
//!
//! A [`DialOption`] is one unit of transport configuration. Options are
//! applied to each tonic [`Endpoint`] in order, so a later option of the same
//! kind overrides an earlier one. Transport security is not an option: it is
//! fixed when the registry is built and applied after every option, which
//! keeps callers from downgrading it through per-call options.

use std::{path::Path, time::Duration};

use meshlink_types::{Address, config::DialConfig};
use tonic::{
    metadata::{Ascii, MetadataKey, MetadataValue},
    transport::{Certificate, ClientTlsConfig, Endpoint},
};

use crate::error::{ConnError, Result};

/// HTTP/2 keep-alive interval for idle connections.
const HTTP2_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP/2 keep-alive timeout.
const HTTP2_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP keepalive interval.
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A validated ASCII metadata pair attached to every request on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    key: MetadataKey<Ascii>,
    value: MetadataValue<Ascii>,
}

impl MetadataEntry {
    /// Metadata key.
    #[must_use]
    pub fn key(&self) -> &MetadataKey<Ascii> {
        &self.key
    }

    /// Metadata value.
    #[must_use]
    pub fn value(&self) -> &MetadataValue<Ascii> {
        &self.value
    }
}

/// One unit of transport configuration applied when establishing a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DialOption {
    /// Timeout for establishing the TCP/HTTP2 connection.
    ConnectTimeout(Duration),
    /// Per-request timeout.
    Timeout(Duration),
    /// Disable Nagle's algorithm.
    TcpNodelay(bool),
    /// TCP keepalive probe interval; `None` disables it.
    TcpKeepalive(Option<Duration>),
    /// HTTP/2 PING interval.
    Http2KeepAliveInterval(Duration),
    /// Time to wait for a PING ack before closing the connection.
    KeepAliveTimeout(Duration),
    /// Send PINGs even when no streams are active.
    KeepAliveWhileIdle(bool),
    /// Maximum in-flight requests per connection.
    ConcurrencyLimit(usize),
    /// At most `limit` requests per `period`.
    RateLimit {
        /// Requests allowed per period.
        limit: u64,
        /// Period length.
        period: Duration,
    },
    /// HTTP/2 initial stream window size.
    InitialStreamWindowSize(u32),
    /// HTTP/2 initial connection window size.
    InitialConnectionWindowSize(u32),
    /// Request buffer size.
    BufferSize(usize),
    /// `user-agent` header value.
    UserAgent(String),
    /// Metadata attached to every request by the channel's interceptor.
    Metadata(MetadataEntry),
}

impl DialOption {
    /// Builds a metadata option, validating key and value.
    ///
    /// # Errors
    ///
    /// Returns [`ConnError::InvalidOption`] if the key is not a valid
    /// lowercase ASCII header name or the value is not visible ASCII.
    pub fn metadata(key: &str, value: &str) -> Result<Self> {
        let key = MetadataKey::from_bytes(key.as_bytes()).map_err(|e| ConnError::InvalidOption {
            message: format!("metadata key '{key}': {e}"),
        })?;
        let value = MetadataValue::try_from(value).map_err(|e| ConnError::InvalidOption {
            message: format!("metadata value for '{key}': {e}"),
        })?;
        Ok(Self::Metadata(MetadataEntry { key, value }))
    }

    /// Applies this option to an endpoint.
    pub(crate) fn apply(&self, endpoint: Endpoint) -> std::result::Result<Endpoint, tonic::transport::Error> {
        let endpoint = match self {
            Self::ConnectTimeout(timeout) => endpoint.connect_timeout(*timeout),
            Self::Timeout(timeout) => endpoint.timeout(*timeout),
            Self::TcpNodelay(enabled) => endpoint.tcp_nodelay(*enabled),
            Self::TcpKeepalive(interval) => endpoint.tcp_keepalive(*interval),
            Self::Http2KeepAliveInterval(interval) => endpoint.http2_keep_alive_interval(*interval),
            Self::KeepAliveTimeout(timeout) => endpoint.keep_alive_timeout(*timeout),
            Self::KeepAliveWhileIdle(enabled) => endpoint.keep_alive_while_idle(*enabled),
            Self::ConcurrencyLimit(limit) => endpoint.concurrency_limit(*limit),
            Self::RateLimit { limit, period } => endpoint.rate_limit(*limit, *period),
            Self::InitialStreamWindowSize(size) => endpoint.initial_stream_window_size(*size),
            Self::InitialConnectionWindowSize(size) => {
                endpoint.initial_connection_window_size(*size)
            },
            Self::BufferSize(size) => endpoint.buffer_size(*size),
            Self::UserAgent(agent) => endpoint.user_agent(agent.clone())?,
            // Applied per request by `MetadataInterceptor`.
            Self::Metadata(_) => endpoint,
        };
        Ok(endpoint)
    }
}

/// The options every registry applies before any configured or caller option.
#[must_use]
pub fn default_options() -> Vec<DialOption> {
    vec![
        DialOption::ConnectTimeout(DEFAULT_CONNECT_TIMEOUT),
        DialOption::TcpNodelay(true),
        DialOption::TcpKeepalive(Some(TCP_KEEPALIVE_INTERVAL)),
        DialOption::Http2KeepAliveInterval(HTTP2_KEEPALIVE_INTERVAL),
        DialOption::KeepAliveTimeout(HTTP2_KEEPALIVE_TIMEOUT),
        DialOption::KeepAliveWhileIdle(true),
    ]
}

/// Maps file configuration onto dial options.
#[must_use]
pub fn options_from_config(config: &DialConfig) -> Vec<DialOption> {
    let mut options = vec![
        DialOption::ConnectTimeout(config.connect_timeout),
        DialOption::Http2KeepAliveInterval(config.keepalive_interval),
        DialOption::KeepAliveTimeout(config.keepalive_timeout),
    ];
    if let Some(timeout) = config.timeout {
        options.push(DialOption::Timeout(timeout));
    }
    options
}

/// Security mode used for every dial of a registry.
#[derive(Debug, Clone, Default)]
pub enum TransportSecurity {
    /// Plaintext HTTP/2.
    #[default]
    Insecure,
    /// TLS with the given client configuration.
    Tls(ClientTlsConfig),
}

impl TransportSecurity {
    /// Builds the security mode from file configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnError::Config`] if the CA certificate cannot be read.
    pub fn from_config(tls: Option<&meshlink_types::config::TlsConfig>) -> Result<Self> {
        let Some(tls) = tls else {
            return Ok(Self::Insecure);
        };

        let mut client = ClientTlsConfig::new();
        if let Some(path) = &tls.ca_cert_path {
            client = client.ca_certificate(read_certificate(path)?);
        }
        if let Some(domain) = &tls.domain {
            client = client.domain_name(domain.clone());
        }
        Ok(Self::Tls(client))
    }

    /// Returns true for TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    fn apply(&self, endpoint: Endpoint) -> std::result::Result<Endpoint, tonic::transport::Error> {
        match self {
            Self::Insecure => Ok(endpoint),
            Self::Tls(config) => endpoint.tls_config(config.clone()),
        }
    }
}

fn read_certificate(path: &Path) -> Result<Certificate> {
    let pem = std::fs::read(path).map_err(|e| ConnError::Config {
        message: format!("failed to read CA certificate {}: {e}", path.display()),
    })?;
    Ok(Certificate::from_pem(pem))
}

/// Everything a dialer needs besides the target.
#[derive(Debug, Clone, Default)]
pub struct DialSettings {
    /// Effective options, in application order.
    pub options: Vec<DialOption>,
    /// Security mode, applied after all options.
    pub security: TransportSecurity,
}

impl DialSettings {
    /// Builds the tonic endpoint for one address.
    ///
    /// # Errors
    ///
    /// Returns the transport error raised by an invalid URI, user agent, or
    /// TLS configuration.
    pub fn endpoint(&self, address: &Address) -> std::result::Result<Endpoint, tonic::transport::Error> {
        let mut endpoint = Endpoint::from_shared(address.uri(self.security.is_tls()))?;
        for option in &self.options {
            endpoint = option.apply(endpoint)?;
        }
        self.security.apply(endpoint)
    }

    /// Metadata entries in option order.
    pub fn metadata(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.options.iter().filter_map(|option| match option {
            DialOption::Metadata(entry) => Some(entry),
            _ => None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn metadata_option_validates_key_and_value() {
        assert!(DialOption::metadata("x-tenant", "acme").is_ok());
        assert!(matches!(
            DialOption::metadata("Bad Key", "v"),
            Err(ConnError::InvalidOption { .. })
        ));
        assert!(matches!(
            DialOption::metadata("x-tenant", "line\nbreak"),
            Err(ConnError::InvalidOption { .. })
        ));
    }

    #[test]
    fn defaults_enable_keepalive() {
        let defaults = default_options();
        assert!(defaults.contains(&DialOption::TcpNodelay(true)));
        assert!(defaults.contains(&DialOption::KeepAliveWhileIdle(true)));
        assert!(defaults.contains(&DialOption::Http2KeepAliveInterval(HTTP2_KEEPALIVE_INTERVAL)));
    }

    #[test]
    fn config_options_carry_timeouts() {
        let config = DialConfig::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(9))
            .build()
            .unwrap();
        let options = options_from_config(&config);
        assert_eq!(options[0], DialOption::ConnectTimeout(Duration::from_secs(2)));
        assert!(options.contains(&DialOption::Timeout(Duration::from_secs(9))));
    }

    #[test]
    fn endpoint_uses_scheme_matching_security() {
        let settings = DialSettings { options: default_options(), ..Default::default() };
        let endpoint = settings.endpoint(&Address::new("127.0.0.1", 10110)).unwrap();
        assert_eq!(endpoint.uri().to_string(), "http://127.0.0.1:10110/");
    }

    #[test]
    fn invalid_user_agent_fails_endpoint_construction() {
        let settings = DialSettings {
            options: vec![DialOption::UserAgent("bad\nagent".to_owned())],
            ..Default::default()
        };
        assert!(settings.endpoint(&Address::new("127.0.0.1", 1)).is_err());
    }

    #[test]
    fn metadata_iterates_in_option_order() {
        let settings = DialSettings {
            options: vec![
                DialOption::metadata("x-a", "1").unwrap(),
                DialOption::TcpNodelay(false),
                DialOption::metadata("x-b", "2").unwrap(),
            ],
            ..Default::default()
        };
        let keys: Vec<&str> = settings.metadata().map(|e| e.key().as_str()).collect();
        assert_eq!(keys, ["x-a", "x-b"]);
    }

    #[test]
    fn missing_ca_file_is_a_config_error() {
        let tls = meshlink_types::config::TlsConfig {
            ca_cert_path: Some("/nonexistent/ca.pem".into()),
            domain: None,
        };
        assert!(matches!(TransportSecurity::from_config(Some(&tls)), Err(ConnError::Config { .. })));
        assert!(!TransportSecurity::from_config(None).unwrap().is_tls());
    }
}
