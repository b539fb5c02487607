//! Error types for the node-addressed transport.
//!
//! Three layers, innermost first:
//! - [`ResolveError`]: the membership service could not produce an address
//! - [`RpcError`]: the connection or the remote handler failed the call
//! - [`TransportError`]: what [`Transport::send`](crate::Transport::send)
//!   reports to its caller

use corelib::NodeId;
use thiserror::Error;

/// Failure to map a node ID to a network address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No descriptor is known for this node.
    #[error("unable to look up descriptor for node {0}")]
    UnknownNode(NodeId),
    /// The membership service could not answer right now.
    #[error("membership service unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a connection's invoke primitive.
///
/// In synchronous mode this comes back from `send` verbatim (wrapped in
/// [`TransportError::Remote`]); in asynchronous mode it is carried on the
/// completed [`Call`](crate::Call).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The remote handler returned an error.
    #[error("{0}")]
    Server(String),
    /// The connection shut down while the call was in flight.
    #[error("connection is shut down")]
    Shutdown,
    /// Arguments or reply could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// The remote peer has no handler for this method.
    #[error("rpc: can't find method {0}")]
    UnknownMethod(String),
}

/// Errors returned by [`Transport::send`](crate::Transport::send).
///
/// Every variant except [`TransportError::Remote`] is detected locally,
/// before anything is sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport was never initialized.
    #[error("unable to send {method} RPC on uninitialized transport")]
    Unavailable { method: String },

    /// The node's address could not be resolved.
    #[error("could not get address for node {node_id}: {source}")]
    AddressResolution {
        node_id: NodeId,
        #[source]
        source: ResolveError,
    },

    /// Shutdown was requested before the connection became ready.
    #[error("server is being stopped; abandoning RPC {method}")]
    Aborted { method: String },

    /// The connection closed before it became ready.
    #[error("client for node {node_id} failed to connect")]
    ConnectionFailed { node_id: NodeId },

    /// The connection is ready but reports itself unhealthy.
    #[error("client for node {node_id} unhealthy")]
    Unhealthy { node_id: NodeId },

    /// The remote invocation itself failed.
    #[error(transparent)]
    Remote(#[from] RpcError),
}

impl TransportError {
    /// True if the call never reached the remote peer.
    ///
    /// Callers use this to decide whether a retry could double-apply.
    pub fn is_local(&self) -> bool {
        !matches!(self, TransportError::Remote(_))
    }

    /// Short label used for metrics and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            TransportError::Unavailable { .. } => "unavailable",
            TransportError::AddressResolution { .. } => "address_resolution",
            TransportError::Aborted { .. } => "aborted",
            TransportError::ConnectionFailed { .. } => "connection_failed",
            TransportError::Unhealthy { .. } => "unhealthy",
            TransportError::Remote(_) => "remote",
        }
    }
}
