//! Proptest strategies for meshlink domain values.
//!
//! # Usage
//!
//! ```no_run
//! use meshlink_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(table in strategies::arb_service_table()) {
//!         prop_assert!(!table.is_empty());
//!     }
//! }
//! ```

use std::{collections::BTreeMap, net::Ipv4Addr};

use meshlink_types::Address;
use proptest::prelude::*;

/// Generates a service name matching `[a-z][a-z0-9_-]{0,15}`.
pub fn arb_service_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

/// Generates 1-4 non-privileged ports; duplicates are allowed.
pub fn arb_ports() -> impl Strategy<Value = Vec<u16>> {
    proptest::collection::vec(1024u16..=u16::MAX, 1..=4)
}

/// Generates a service table of 1-8 services, every one with at least one port.
pub fn arb_service_table() -> impl Strategy<Value = BTreeMap<String, Vec<u16>>> {
    proptest::collection::btree_map(arb_service_name(), arb_ports(), 1..=8)
}

/// Generates an IPv4 `host:port` address with a non-zero port.
pub fn arb_address() -> impl Strategy<Value = Address> {
    (any::<[u8; 4]>(), 1u16..=u16::MAX)
        .prop_map(|(octets, port)| Address::new(Ipv4Addr::from(octets).to_string(), port))
}
