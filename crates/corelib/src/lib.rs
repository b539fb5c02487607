//! Core library for the cluster's inter-node plumbing.
//!
//! This crate provides the shared vocabulary used by the transport and tools:
//! - Node identifiers and descriptors
//! - Network addresses
//! - Common error types

pub mod error;
pub mod network;
pub mod node;

pub use error::{Error, Result};
pub use network::NetworkAddress;
pub use node::{Node, NodeId};
