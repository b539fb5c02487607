//! CLI tool for inspecting cluster membership and node-addressed RPC.
//!
//! Provides commands for:
//! - Listing the membership table
//! - Resolving a node ID to its address
//! - Pinging a node through the transport (in-process cluster)

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
