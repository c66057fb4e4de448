//! Service name → address resolution over the static topology.
//!
//! Pure lookups with no state beyond the immutable topology, safe to call
//! from any number of tasks without synchronization.

use std::sync::Arc;

use meshlink_types::{Address, ServiceName, ServiceTopology};

use crate::error::{ConnError, Result};

/// Resolves a service to its addresses, in configured port order.
///
/// # Errors
///
/// Returns [`ConnError::UnknownService`] if the name is not in the topology.
pub fn resolve(topology: &ServiceTopology, service: &str) -> Result<Vec<Address>> {
    topology
        .addresses(service)
        .ok_or_else(|| ConnError::UnknownService { service: service.to_owned() })
}

/// Joins addresses into the comma-separated list used by resolver targets.
#[must_use]
pub fn join_addresses(addresses: &[Address]) -> String {
    addresses.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// Shared handle to the topology used by the registry.
#[derive(Debug, Clone)]
pub struct AddressBook {
    topology: Arc<ServiceTopology>,
}

impl AddressBook {
    /// Wraps a topology.
    #[must_use]
    pub fn new(topology: ServiceTopology) -> Self {
        Self { topology: Arc::new(topology) }
    }

    /// See [`resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnError::UnknownService`] if the name is not in the topology.
    pub fn resolve(&self, service: &str) -> Result<Vec<Address>> {
        resolve(&self.topology, service)
    }

    /// Declared service names.
    pub fn services(&self) -> impl Iterator<Item = &ServiceName> {
        self.topology.services()
    }

    /// The underlying topology.
    #[must_use]
    pub fn topology(&self) -> &ServiceTopology {
        &self.topology
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeMap;

    use meshlink_test_utils::strategies::arb_service_table;
    use proptest::prelude::*;

    use super::*;

    fn book() -> AddressBook {
        AddressBook::new(
            ServiceTopology::new("127.0.0.1", [("svcA", vec![1001, 1002]), ("svcB", vec![2001])])
                .unwrap(),
        )
    }

    #[test]
    fn resolves_known_service() {
        let addrs = book().resolve("svcA").unwrap();
        assert_eq!(addrs, vec![Address::new("127.0.0.1", 1001), Address::new("127.0.0.1", 1002)]);
    }

    #[test]
    fn unknown_service_is_an_error() {
        let err = book().resolve("svcC").unwrap_err();
        assert!(matches!(err, ConnError::UnknownService { ref service } if service == "svcC"));
    }

    #[test]
    fn join_addresses_is_comma_separated() {
        let addrs = book().resolve("svcA").unwrap();
        assert_eq!(join_addresses(&addrs), "127.0.0.1:1001,127.0.0.1:1002");
        assert_eq!(join_addresses(&[]), "");
    }

    proptest! {
        #[test]
        fn every_declared_service_resolves_to_its_ports_in_order(
            table in arb_service_table(),
        ) {
            let topology = ServiceTopology::new("10.0.0.1", table.clone()).unwrap();

            for (name, ports) in &table {
                let addrs = resolve(&topology, name).unwrap();
                prop_assert!(!addrs.is_empty());
                let resolved_ports: Vec<u16> = addrs.iter().map(|a| a.port).collect();
                prop_assert_eq!(&resolved_ports, ports);
                prop_assert!(addrs.iter().all(|a| a.host == "10.0.0.1"));
            }
        }

        #[test]
        fn undeclared_names_never_resolve(
            table in arb_service_table(),
            probe in "[A-Z]{1,8}",
        ) {
            // Generated table keys are lowercase, so an uppercase probe is never declared.
            let table: BTreeMap<String, Vec<u16>> = table;
            let topology = ServiceTopology::new("10.0.0.1", table).unwrap();
            let is_unknown = matches!(resolve(&topology, &probe), Err(ConnError::UnknownService { .. }));
            prop_assert!(is_unknown);
        }
    }
}
