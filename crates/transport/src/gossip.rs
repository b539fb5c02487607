//! Membership-backed address resolution.
//!
//! The transport only needs one question answered: where does node N live
//! right now? [`AddressResolver`] is that seam; [`Gossip`] is the in-memory
//! node table the membership protocol keeps up to date.

use async_trait::async_trait;
use corelib::{NetworkAddress, Node, NodeId};
use dashmap::DashMap;
use tracing::debug;

use crate::config::MembershipConfig;
use crate::error::ResolveError;

/// Maps logical node IDs to their current network address.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as a single resolver is
/// shared by every concurrent send.
#[async_trait]
pub trait AddressResolver: Send + Sync + 'static {
    /// Look up the current address of `node_id`.
    async fn resolve(&self, node_id: NodeId) -> Result<NetworkAddress, ResolveError>;
}

/// Concurrent node ID to address table.
///
/// Addresses are replaced in place when a node moves (rebalance, restart);
/// lookups always see the latest value.
#[derive(Debug, Default)]
pub struct Gossip {
    nodes: DashMap<NodeId, NetworkAddress>,
}

impl Gossip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table seeded from static membership.
    pub fn from_config(config: &MembershipConfig) -> Self {
        let gossip = Self::new();
        for node in &config.nodes {
            gossip.add_node(node.clone());
        }
        gossip
    }

    /// Add or update a node descriptor.
    pub fn add_node(&self, node: Node) {
        self.set_node_address(node.id, node.address);
    }

    /// Record the current address of `node_id`.
    ///
    /// # Returns
    /// The previous address, if the node was already known
    pub fn set_node_address(&self, node_id: NodeId, address: NetworkAddress) -> Option<NetworkAddress> {
        let previous = self.nodes.insert(node_id, address);
        if let Some(prev) = &previous {
            debug!(%node_id, from = %prev, "node address updated");
        }
        previous
    }

    /// Remove a node. Returns true if it was present.
    pub fn remove_node(&self, node_id: NodeId) -> bool {
        self.nodes.remove(&node_id).is_some()
    }

    pub fn node_address(&self, node_id: NodeId) -> Option<NetworkAddress> {
        self.nodes.get(&node_id).map(|entry| entry.value().clone())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All known nodes, sorted by ID.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .map(|entry| Node::new(*entry.key(), entry.value().clone()))
            .collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }
}

#[async_trait]
impl AddressResolver for Gossip {
    async fn resolve(&self, node_id: NodeId) -> Result<NetworkAddress, ResolveError> {
        self.node_address(node_id)
            .ok_or(ResolveError::UnknownNode(node_id))
    }
}
