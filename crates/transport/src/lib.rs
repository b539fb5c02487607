//! Node-addressed RPC transport for the storage cluster.
//!
//! This crate delivers an RPC to exactly one peer named by its [`NodeId`]:
//! - Address resolution through the membership table ([`Gossip`])
//! - Shared connection handles per address ([`Context`])
//! - Shutdown-aware readiness and health gating ([`RpcTransport`])
//! - Blocking or completion-sink delivery ([`Dispatch`])
//!
//! [`NodeId`]: corelib::NodeId

pub mod client;
pub mod config;
pub mod error;
pub mod gossip;
pub mod local;
pub mod signal;
pub mod transport;

pub use client::{Call, Completion, Connection, Connector, Context, RpcContext};
pub use config::{ConfigError, MembershipConfig};
pub use error::{ResolveError, RpcError, TransportError};
pub use gossip::{AddressResolver, Gossip};
pub use local::{LocalClient, LocalConnector, Registry};
pub use signal::{Latch, Stopper};
pub use transport::{Dispatch, RpcTransport, Transport};
