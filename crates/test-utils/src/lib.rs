//! Shared test utilities for meshlink crates.
//!
//! - [`TestServer`] - Loopback gRPC server with a controllable health service
//! - [`closed_port`] - An address nothing listens on
//! - [`assert_eventually`] / [`assert_eventually_async`] - Poll a condition until it holds
//! - [`strategies`] - Proptest generators for topologies and addresses

#![deny(unsafe_code)]

mod assertions;
pub use assertions::{assert_eventually, assert_eventually_async};

mod ports;
pub use ports::closed_port;

mod server;
pub use server::TestServer;

pub mod strategies;
