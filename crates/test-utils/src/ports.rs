//! Port helpers.

use std::net::{Ipv4Addr, TcpListener};

use meshlink_types::Address;

/// Returns a loopback address that nothing is listening on.
///
/// The port is taken from the OS and released immediately, so another
/// process could in principle claim it before the test dials it.
pub fn closed_port() -> Address {
    let port = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap_or(1);
    Address::new(Ipv4Addr::LOCALHOST.to_string(), port)
}
