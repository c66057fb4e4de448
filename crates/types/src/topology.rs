//! Static service topology.

use std::collections::{BTreeMap, btree_map::Entry};

use crate::{Address, ServiceName, config::ConfigError};

/// Immutable mapping of service name to listen ports on one shared host.
///
/// Built once at startup and never mutated. Every service resolves to at
/// least one port. Ports keep their configured order and may repeat across
/// services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTopology {
    listen_ip: String,
    services: BTreeMap<ServiceName, Vec<u16>>,
}

impl ServiceTopology {
    /// Creates a topology, rejecting services without ports.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `listen_ip` is empty, any
    /// service has an empty port list, or a service name repeats.
    pub fn new<I, N>(listen_ip: impl Into<String>, services: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (N, Vec<u16>)>,
        N: Into<ServiceName>,
    {
        let listen_ip = listen_ip.into();
        if listen_ip.trim().is_empty() {
            return Err(ConfigError::Validation { message: "listen_ip must not be empty".into() });
        }

        let mut table = BTreeMap::new();
        for (name, ports) in services {
            let name = name.into();
            if name.as_str().is_empty() {
                return Err(ConfigError::Validation {
                    message: "service names must not be empty".into(),
                });
            }
            if ports.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("service '{name}' must declare at least one port"),
                });
            }
            if let Entry::Vacant(slot) = table.entry(name.clone()) {
                slot.insert(ports);
            } else {
                return Err(ConfigError::Validation {
                    message: format!("service '{name}' is declared more than once"),
                });
            }
        }

        Ok(Self { listen_ip, services: table })
    }

    /// Returns the IP shared by every service.
    #[must_use]
    pub fn listen_ip(&self) -> &str {
        &self.listen_ip
    }

    /// Returns the configured ports for a service.
    #[must_use]
    pub fn ports(&self, service: &str) -> Option<&[u16]> {
        self.services.get(service).map(Vec::as_slice)
    }

    /// Returns the addresses for a service in configured port order.
    #[must_use]
    pub fn addresses(&self, service: &str) -> Option<Vec<Address>> {
        self.ports(service)
            .map(|ports| ports.iter().map(|&port| Address::new(self.listen_ip.clone(), port)).collect())
    }

    /// Returns whether the service is declared.
    #[must_use]
    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Iterates over declared service names in sorted order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceName> {
        self.services.keys()
    }

    /// Number of declared services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true when no services are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn addresses_follow_configured_port_order() {
        let topology =
            ServiceTopology::new("127.0.0.1", [("svcA", vec![1002, 1001, 1003])]).unwrap();

        let addrs = topology.addresses("svcA").unwrap();
        let rendered: Vec<String> = addrs.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["127.0.0.1:1002", "127.0.0.1:1001", "127.0.0.1:1003"]);
    }

    #[test]
    fn unknown_service_has_no_addresses() {
        let topology = ServiceTopology::new("127.0.0.1", [("svcA", vec![1001])]).unwrap();
        assert!(topology.addresses("svcB").is_none());
        assert!(!topology.contains("svcB"));
    }

    #[test]
    fn rejects_service_without_ports() {
        let err = ServiceTopology::new("127.0.0.1", [("svcA", vec![])]).unwrap_err();
        assert!(err.to_string().contains("svcA"));
    }

    #[test]
    fn rejects_duplicate_service_names() {
        let err =
            ServiceTopology::new("127.0.0.1", [("svcA", vec![1001]), ("svcA", vec![1002])]).unwrap_err();
        assert!(err.to_string().contains("svcA"));
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_empty_listen_ip() {
        let result = ServiceTopology::new(" ", [("svcA", vec![1001])]);
        assert!(result.is_err());
    }

    #[test]
    fn ports_may_repeat_across_services() {
        let topology =
            ServiceTopology::new("10.0.0.1", [("auth", vec![7000]), ("push", vec![7000])]).unwrap();
        assert_eq!(topology.ports("auth"), topology.ports("push"));
        assert_eq!(topology.len(), 2);
    }
}
