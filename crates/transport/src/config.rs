//! Membership configuration.
//!
//! Seeds the [`Gossip`](crate::Gossip) table from a static node list, e.g.
//!
//! ```json
//! { "nodes": [ { "id": 1, "address": "10.0.0.1:26257" },
//!              { "id": 2, "address": "10.0.0.2:26257" } ] }
//! ```

use std::collections::HashSet;
use std::path::Path;

use corelib::Node;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a [`MembershipConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read membership file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse membership file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] corelib::Error),
}

/// Static cluster membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipConfig {
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl MembershipConfig {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Node IDs must be unique.
    pub fn validate(&self) -> corelib::Result<()> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(corelib::Error::InvalidNode(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{NetworkAddress, NodeId};

    #[test]
    fn test_from_json() {
        let config = MembershipConfig::from_json(
            r#"{ "nodes": [ { "id": 1, "address": "10.0.0.1:26257" },
                            { "id": 2, "address": "[::1]:26258" } ] }"#,
        )
        .unwrap();
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].id, NodeId(2));
        assert_eq!(config.nodes[1].address, NetworkAddress::new("::1", 26258));
    }

    #[test]
    fn test_empty_document() {
        let config = MembershipConfig::from_json("{}").unwrap();
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = MembershipConfig::from_json(
            r#"{ "nodes": [ { "id": 1, "address": "a:1" }, { "id": 1, "address": "b:1" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(corelib::Error::InvalidNode(_))));
    }

    #[test]
    fn test_rejects_bad_address() {
        let err = MembershipConfig::from_json(r#"{ "nodes": [ { "id": 1, "address": "nope" } ] }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
