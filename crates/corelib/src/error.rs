//! Error types for the core library.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Address string could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),
}
