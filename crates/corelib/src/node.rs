//! Node abstractions for the cluster.
//!
//! Nodes are logical cluster members. They are identified by a compact
//! `NodeId` that is cheap to compare and hash, independent of where the node
//! currently lives on the network.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::NetworkAddress;

/// Compact identifier for a node in the cluster.
///
/// Newtype over `u64`. Uniqueness is owned by the membership service, not by
/// this type.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// Node descriptor as carried by the membership service.
///
/// Keep this struct small and cheap to clone; connection state lives with the
/// RPC context, not here. The address may change over the node's lifetime
/// (rebalancing, restart).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Current network endpoint of the node.
    pub address: NetworkAddress,
}

impl Node {
    /// Construct a new node descriptor.
    pub fn new(id: NodeId, address: NetworkAddress) -> Self {
        Self { id, address }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}@{}", self.id, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_is_decimal() {
        assert_eq!(NodeId(5).to_string(), "5");
        assert_eq!(NodeId(1234).to_string(), "1234");
    }

    #[test]
    fn test_node_id_serde_transparent() {
        let json = serde_json::to_string(&NodeId(7)).unwrap();
        assert_eq!(json, "7");
        let decoded: NodeId = serde_json::from_str("7").unwrap();
        assert_eq!(decoded, NodeId(7));
    }

    #[test]
    fn test_node_display() {
        let node = Node::new(NodeId(2), NetworkAddress::new("10.0.0.2", 26257));
        assert_eq!(node.to_string(), "n2@10.0.0.2:26257");
    }
}
