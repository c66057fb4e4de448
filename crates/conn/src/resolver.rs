//! Resolver schemes for dial targets.
//!
//! A dial target of the form `scheme:///endpoint` is handed to the resolver
//! registered for `scheme`, which turns `endpoint` into the address set the
//! channel balances across. The [`DirectResolver`] treats the endpoint as a
//! literal comma-separated address list: no DNS, no registry lookup.
//!
//! Resolvers only parse. They never probe health, retry, or cache.

use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::{Arc, LazyLock, Once},
};

use meshlink_types::Address;
use parking_lot::RwLock;

use crate::address_book::join_addresses;

/// Scheme token of the [`DirectResolver`].
pub const DIRECT_SCHEME: &str = "direct";

/// Separator between a scheme and its endpoint.
const SCHEME_SEPARATOR: &str = ":///";

/// Errors that can occur while resolving a dial target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No resolver is registered for the scheme.
    #[error("no resolver registered for scheme '{scheme}'")]
    UnregisteredScheme {
        /// The unknown scheme token.
        scheme: String,
    },

    /// The target names no addresses.
    #[error("target contains no addresses")]
    EmptyTarget,

    /// An entry of the address list is not `host:port`.
    #[error("invalid address '{entry}' in target: {message}")]
    InvalidAddress {
        /// The offending list entry.
        entry: String,
        /// Parse failure.
        message: String,
    },

    /// The target string is neither `scheme:///endpoint` nor `host:port`.
    #[error("malformed target '{target}': {message}")]
    MalformedTarget {
        /// The full target string.
        target: String,
        /// Parse failure.
        message: String,
    },
}

/// A parsed dial target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DialTarget {
    /// `scheme:///endpoint`, resolved through the scheme registry.
    Resolved {
        /// Resolver scheme token.
        scheme: String,
        /// Scheme-specific endpoint string.
        endpoint: String,
    },
    /// Plain `host:port`, dialed without a resolver.
    Direct(Address),
}

impl DialTarget {
    /// Builds a `direct:///a,b,...` target for the given addresses.
    #[must_use]
    pub fn direct_list(addresses: &[Address]) -> Self {
        Self::Resolved { scheme: DIRECT_SCHEME.to_owned(), endpoint: join_addresses(addresses) }
    }

    /// Returns the scheme token, if this target uses one.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        match self {
            Self::Resolved { scheme, .. } => Some(scheme),
            Self::Direct(_) => None,
        }
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved { scheme, endpoint } => write!(f, "{scheme}{SCHEME_SEPARATOR}{endpoint}"),
            Self::Direct(address) => write!(f, "{address}"),
        }
    }
}

impl FromStr for DialTarget {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((scheme, endpoint)) = s.split_once(SCHEME_SEPARATOR) {
            if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(ResolveError::MalformedTarget {
                    target: s.to_owned(),
                    message: "scheme must be a non-empty alphanumeric token".to_owned(),
                });
            }
            return Ok(Self::Resolved { scheme: scheme.to_owned(), endpoint: endpoint.to_owned() });
        }

        s.parse::<Address>().map(Self::Direct).map_err(|e| ResolveError::MalformedTarget {
            target: s.to_owned(),
            message: e.message,
        })
    }
}

/// Turns the endpoint part of a dial target into addresses.
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Scheme token this resolver handles.
    fn scheme(&self) -> &str;

    /// Resolves an endpoint string to the address set to connect to.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when the endpoint cannot be interpreted.
    fn resolve(&self, endpoint: &str) -> Result<Vec<Address>, ResolveError>;
}

/// Resolver for literal address lists (`direct:///h1:p1,h2:p2`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

impl DirectResolver {
    /// Registers the direct scheme with the process-wide registry.
    ///
    /// Safe to call any number of times from any thread; only the first
    /// call registers.
    pub fn register_once() {
        static REGISTER: Once = Once::new();
        REGISTER.call_once(|| {
            register(Arc::new(DirectResolver));
            tracing::debug!(scheme = DIRECT_SCHEME, "registered resolver scheme");
        });
    }
}

impl Resolver for DirectResolver {
    fn scheme(&self) -> &str {
        DIRECT_SCHEME
    }

    fn resolve(&self, endpoint: &str) -> Result<Vec<Address>, ResolveError> {
        if endpoint.trim().is_empty() {
            return Err(ResolveError::EmptyTarget);
        }

        endpoint
            .split(',')
            .map(str::trim)
            .map(|entry| {
                if entry.is_empty() {
                    return Err(ResolveError::InvalidAddress {
                        entry: String::new(),
                        message: "empty entry in address list".to_owned(),
                    });
                }
                entry.parse::<Address>().map_err(|e| ResolveError::InvalidAddress {
                    entry: entry.to_owned(),
                    message: e.message,
                })
            })
            .collect()
    }
}

/// Process-wide scheme → resolver table.
static SCHEMES: LazyLock<RwLock<BTreeMap<String, Arc<dyn Resolver>>>> =
    LazyLock::new(|| RwLock::new(BTreeMap::new()));

/// Registers a resolver for its scheme.
///
/// The first registration of a scheme wins. Registering the same scheme
/// again leaves the table unchanged and returns the resolver already in it.
pub fn register(resolver: Arc<dyn Resolver>) -> Arc<dyn Resolver> {
    let mut schemes = SCHEMES.write();
    Arc::clone(schemes.entry(resolver.scheme().to_owned()).or_insert(resolver))
}

/// Looks up the resolver for a scheme.
#[must_use]
pub fn lookup(scheme: &str) -> Option<Arc<dyn Resolver>> {
    SCHEMES.read().get(scheme).cloned()
}

/// Returns every registered scheme token, sorted.
#[must_use]
pub fn registered_schemes() -> Vec<String> {
    SCHEMES.read().keys().cloned().collect()
}

/// Resolves a `Resolved` target through the registry.
///
/// `Direct` targets resolve to their single address.
///
/// # Errors
///
/// Returns [`ResolveError::UnregisteredScheme`] for unknown schemes, or the
/// resolver's own error.
pub fn resolve_target(target: &DialTarget) -> Result<Vec<Address>, ResolveError> {
    match target {
        DialTarget::Direct(address) => Ok(vec![address.clone()]),
        DialTarget::Resolved { scheme, endpoint } => {
            let resolver = lookup(scheme)
                .ok_or_else(|| ResolveError::UnregisteredScheme { scheme: scheme.clone() })?;
            resolver.resolve(endpoint)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use meshlink_test_utils::strategies::arb_address;
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug)]
    struct FixedResolver(&'static str, Vec<Address>);

    impl Resolver for FixedResolver {
        fn scheme(&self) -> &str {
            self.0
        }

        fn resolve(&self, _endpoint: &str) -> Result<Vec<Address>, ResolveError> {
            Ok(self.1.clone())
        }
    }

    #[test]
    fn direct_list_target_renders_triple_slash_form() {
        let target = DialTarget::direct_list(&[
            Address::new("127.0.0.1", 2001),
            Address::new("127.0.0.1", 2002),
        ]);
        assert_eq!(target.to_string(), "direct:///127.0.0.1:2001,127.0.0.1:2002");
        assert_eq!(target.scheme(), Some(DIRECT_SCHEME));
    }

    #[test]
    fn parses_resolved_and_direct_targets() {
        let resolved: DialTarget = "direct:///10.0.0.1:1,10.0.0.2:2".parse().unwrap();
        assert_eq!(
            resolved,
            DialTarget::Resolved {
                scheme: "direct".to_owned(),
                endpoint: "10.0.0.1:1,10.0.0.2:2".to_owned()
            }
        );

        let direct: DialTarget = "10.0.0.1:50051".parse().unwrap();
        assert_eq!(direct, DialTarget::Direct(Address::new("10.0.0.1", 50051)));
        assert_eq!(direct.scheme(), None);
    }

    #[test]
    fn rejects_malformed_targets() {
        assert!(matches!(
            ":///10.0.0.1:1".parse::<DialTarget>(),
            Err(ResolveError::MalformedTarget { .. })
        ));
        assert!(matches!(
            "no-port-here".parse::<DialTarget>(),
            Err(ResolveError::MalformedTarget { .. })
        ));
    }

    #[test]
    fn direct_resolver_parses_literal_list_in_order() {
        let addrs = DirectResolver.resolve("127.0.0.1:2002, 127.0.0.1:2001").unwrap();
        assert_eq!(addrs, vec![Address::new("127.0.0.1", 2002), Address::new("127.0.0.1", 2001)]);
    }

    #[test]
    fn direct_resolver_rejects_empty_and_invalid_entries() {
        assert_eq!(DirectResolver.resolve(""), Err(ResolveError::EmptyTarget));
        assert_eq!(DirectResolver.resolve("  "), Err(ResolveError::EmptyTarget));
        assert!(matches!(
            DirectResolver.resolve("127.0.0.1:1,bogus"),
            Err(ResolveError::InvalidAddress { entry, .. }) if entry == "bogus"
        ));
    }

    #[test]
    fn direct_resolver_rejects_blank_list_entries() {
        for endpoint in ["127.0.0.1:1,,127.0.0.1:2", "127.0.0.1:1,", ",127.0.0.1:1", " , "] {
            assert!(
                matches!(
                    DirectResolver.resolve(endpoint),
                    Err(ResolveError::InvalidAddress { ref entry, .. }) if entry.is_empty()
                ),
                "{endpoint:?} should be rejected"
            );
        }
    }

    #[test]
    fn register_once_is_idempotent() {
        DirectResolver::register_once();
        DirectResolver::register_once();

        let schemes = registered_schemes();
        assert_eq!(schemes.iter().filter(|s| s.as_str() == DIRECT_SCHEME).count(), 1);
        assert!(lookup(DIRECT_SCHEME).is_some());
    }

    #[test]
    fn first_registration_of_a_scheme_wins() {
        let first = Arc::new(FixedResolver("fixed-first-wins", vec![Address::new("a", 1)]));
        let second = Arc::new(FixedResolver("fixed-first-wins", vec![Address::new("b", 2)]));

        register(first);
        let kept = register(second);

        assert_eq!(kept.resolve("").unwrap(), vec![Address::new("a", 1)]);
    }

    #[test]
    fn resolve_target_uses_registry() {
        DirectResolver::register_once();
        let target: DialTarget = "direct:///127.0.0.1:7000".parse().unwrap();
        assert_eq!(resolve_target(&target).unwrap(), vec![Address::new("127.0.0.1", 7000)]);

        let unknown: DialTarget = "nowhere:///127.0.0.1:7000".parse().unwrap();
        assert!(matches!(
            resolve_target(&unknown),
            Err(ResolveError::UnregisteredScheme { scheme }) if scheme == "nowhere"
        ));
    }

    proptest! {
        #[test]
        fn direct_resolver_preserves_joined_address_order(
            addresses in proptest::collection::vec(arb_address(), 1..6),
        ) {
            let resolved = DirectResolver.resolve(&join_addresses(&addresses)).unwrap();
            prop_assert_eq!(resolved, addresses);
        }
    }
}
