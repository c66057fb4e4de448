//! Core types for the meshlink service-connection layer.
//!
//! This crate provides the values shared by every meshlink crate:
//! - [`ServiceName`] and [`Address`] identifiers
//! - [`ServiceTopology`], the immutable service → ports table
//! - Serde configuration structs with validation (see [`config`])
//!
//! Nothing in here performs I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
mod service;
mod topology;

pub use service::{Address, AddressParseError, ServiceName};
pub use topology::ServiceTopology;
