//! Connection-layer error types.
//!
//! Every error names the service it concerns so operators can tell
//! "this service is not declared" apart from "it is declared but unreachable".
//! Fan-out failures additionally name each address that failed.
//!
//! The layer never retries. [`ConnError::is_retryable`] tells callers which
//! failures are worth retrying as a whole resolve-and-dial operation.

use std::fmt;

use meshlink_types::Address;
use snafu::{Location, Snafu};

use crate::resolver::ResolveError;

/// Result type alias for connection-layer operations.
pub type Result<T, E = ConnError> = std::result::Result<T, E>;

/// Why a single dial could not produce a channel.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DialError {
    /// Transport-level failure (connect, TLS, invalid endpoint URI).
    #[snafu(display("transport error: {source}"))]
    Transport {
        /// Underlying transport error.
        source: tonic::transport::Error,
    },

    /// The dial target could not be resolved to addresses.
    #[snafu(display("resolve error: {source}"))]
    Resolve {
        /// Underlying resolver error.
        source: ResolveError,
    },
}

/// One failed address in a fan-out dial.
#[derive(Debug)]
pub struct AddressFailure {
    /// The address that could not be dialed.
    pub address: Address,
    /// The dial failure.
    pub error: DialError,
}

impl fmt::Display for AddressFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.error)
    }
}

/// Display helper joining fan-out failures.
fn join_failures(failures: &[AddressFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Connection-layer errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnError {
    /// The service name is not declared in the topology.
    #[snafu(display("unknown service '{service}'"))]
    UnknownService {
        /// The requested service.
        service: String,
    },

    /// A dial for the service failed.
    #[snafu(display("failed to dial service '{service}' at {target} ({location}): {source}"))]
    Dial {
        /// The service being dialed.
        service: String,
        /// The dial target (resolver target or `host:port`).
        target: String,
        /// Underlying dial failure.
        source: DialError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Every per-address dial of a fan-out failed.
    #[snafu(display(
        "no connections established for service '{service}': {}",
        join_failures(failures)
    ))]
    NoConnectionsEstablished {
        /// The service being dialed.
        service: String,
        /// One entry per address, in address order.
        failures: Vec<AddressFailure>,
    },

    /// The caller cancelled the operation.
    #[snafu(display("dial of service '{service}' cancelled"))]
    Cancelled {
        /// The service being dialed.
        service: String,
    },

    /// The caller's deadline expired before the dial completed.
    #[snafu(display("dial of service '{service}' exceeded deadline of {timeout_ms}ms"))]
    DeadlineExceeded {
        /// The service being dialed.
        service: String,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// A dial option could not be constructed.
    #[snafu(display("invalid dial option: {message}"))]
    InvalidOption {
        /// Error description.
        message: String,
    },

    /// Configuration validation error.
    #[snafu(display("configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },
}

impl ConnError {
    /// Returns true if retrying the whole operation may succeed.
    ///
    /// Retryable:
    /// - `Dial` and `NoConnectionsEstablished`: the endpoint may come up
    /// - `DeadlineExceeded`: a longer deadline may suffice
    ///
    /// Non-retryable:
    /// - `UnknownService`: caller error
    /// - `Cancelled`: the caller asked to stop
    /// - `InvalidOption`, `Config`: fixed inputs
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Dial { source, .. } => matches!(source, DialError::Transport { .. }),
            Self::NoConnectionsEstablished { .. } => true,
            Self::DeadlineExceeded { .. } => true,
            Self::UnknownService { .. } => false,
            Self::Cancelled { .. } => false,
            Self::InvalidOption { .. } => false,
            Self::Config { .. } => false,
        }
    }

    /// Returns the service this error concerns, if any.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::UnknownService { service }
            | Self::Dial { service, .. }
            | Self::NoConnectionsEstablished { service, .. }
            | Self::Cancelled { service }
            | Self::DeadlineExceeded { service, .. } => Some(service),
            Self::InvalidOption { .. } | Self::Config { .. } => None,
        }
    }
}

impl From<meshlink_types::config::ConfigError> for ConnError {
    fn from(err: meshlink_types::config::ConfigError) -> Self {
        Self::Config { message: err.to_string() }
    }
}
