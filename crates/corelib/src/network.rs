//! Core networking abstractions shared across the workspace.
//!
//! A [`NetworkAddress`] is the endpoint a node can currently be reached at.
//! It is looked up per call and never cached by the transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Unresolved `host:port` endpoint.
///
/// The host is kept as given (hostname or IP literal); name resolution is the
/// connection layer's job.
///
/// # Example
///
/// ```rust
/// use corelib::NetworkAddress;
///
/// let addr: NetworkAddress = "10.0.0.1:26257".parse().unwrap();
/// assert_eq!(addr.port(), 26257);
/// assert_eq!(addr.to_string(), "10.0.0.1:26257");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkAddress {
    host: String,
    port: u16,
}

impl NetworkAddress {
    /// Create an address from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NetworkAddress {
    type Err = Error;

    /// Parse `host:port`. IPv6 hosts must be bracketed (`[::1]:80`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(format!("missing port in {:?}", s)))?;

        let host = match host.strip_prefix('[') {
            Some(inner) => inner
                .strip_suffix(']')
                .ok_or_else(|| Error::InvalidAddress(format!("unbalanced brackets in {:?}", s)))?,
            None if host.contains(':') => {
                return Err(Error::InvalidAddress(format!(
                    "IPv6 host must be bracketed in {:?}",
                    s
                )))
            }
            None => host,
        };
        if host.is_empty() {
            return Err(Error::InvalidAddress(format!("empty host in {:?}", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidAddress(format!("bad port in {:?}: {}", s, e)))?;

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for NetworkAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NetworkAddress> for String {
    fn from(addr: NetworkAddress) -> Self {
        addr.to_string()
    }
}
