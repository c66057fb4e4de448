//! Service identifiers and network addresses.

use std::{borrow::Borrow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Logical name of a group of RPC endpoints serving the same role.
///
/// Service names are opaque and compared byte-for-byte. They are the only
/// key used by connection caches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    /// Creates a service name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ServiceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ServiceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Error returned when a `host:port` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("invalid address '{input}': {message}"))]
pub struct AddressParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub message: String,
}

/// A `host:port` pair an RPC endpoint listens on.
///
/// IPv6 hosts keep their brackets (`[::1]`) so that [`Display`](fmt::Display)
/// output is always a valid authority.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Address {
    /// Creates an address from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        // Bare IPv6 literals need brackets to form an authority.
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host
        };
        Self { host, port }
    }

    /// Returns the URI used to dial this address.
    #[must_use]
    pub fn uri(&self, tls: bool) -> String {
        let scheme = if tls { "https" } else { "http" };
        format!("{scheme}://{self}")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |message: &str| AddressParseError { input: s.to_owned(), message: message.into() };

        let (host, port) = s.rsplit_once(':').ok_or_else(|| fail("missing ':port'"))?;
        if host.is_empty() {
            return Err(fail("empty host"));
        }
        if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
            return Err(fail("IPv6 hosts must be bracketed"));
        }
        if host.contains(char::is_whitespace) || host.contains('/') {
            return Err(fail("host contains invalid characters"));
        }
        let port = port.parse::<u16>().map_err(|_| fail("port must be an integer in 0..=65535"))?;

        Ok(Self { host: host.to_owned(), port })
    }
}
