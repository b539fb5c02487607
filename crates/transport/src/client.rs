//! Connection handles and the RPC context that hands them out.
//!
//! The transport never owns connection state. It observes a handle's
//! `ready`/`closed` signals and `healthy` flag, and uses its invoke
//! primitives. Establishing, encoding and tearing down links is the job of
//! the [`Connection`] implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use corelib::NetworkAddress;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::RpcError;
use crate::signal::Stopper;

/// Sink on which an asynchronous call is posted once it completes.
pub type Completion<A, R> = mpsc::UnboundedSender<Call<A, R>>;

/// An asynchronous call, as delivered on its [`Completion`] sink.
///
/// `reply` holds the remote response iff `error` is `None`; otherwise it is
/// the value the caller supplied, untouched.
pub struct Call<A, R> {
    pub method: String,
    pub args: A,
    pub reply: R,
    pub error: Option<RpcError>,
}

impl<A, R> Call<A, R> {
    pub fn new(method: impl Into<String>, args: A, reply: R) -> Self {
        Self {
            method: method.into(),
            args,
            reply,
            error: None,
        }
    }

    /// Consume the call, yielding the reply or the error.
    pub fn into_result(self) -> Result<R, RpcError> {
        match self.error {
            None => Ok(self.reply),
            Some(err) => Err(err),
        }
    }
}

impl<A, R> fmt::Debug for Call<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", &self.method)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Outbound link to one address, shared by every caller targeting it.
///
/// # Signals
///
/// - `ready()` resolves once the link is usable and stays resolved.
/// - `closed()` resolves once the link has permanently failed.
/// - `is_healthy()` may flip at any point in the link's lifetime.
///
/// Neither signal is required to ever resolve; callers race them against
/// each other and against shutdown.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Resolves when the connection is established and usable.
    async fn ready(&self);

    /// Resolves when the connection has permanently failed.
    async fn closed(&self);

    fn is_closed(&self) -> bool;

    fn is_healthy(&self) -> bool;

    /// Invoke `method` and wait for the outcome.
    ///
    /// `reply` is written only when the call succeeds.
    async fn call<A, R>(&self, method: &str, args: &A, reply: &mut R) -> Result<(), RpcError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned + Send;

    /// Start `call` without waiting. The completed call is posted on `done`
    /// exactly once, success or failure.
    fn go<A, R>(&self, call: Call<A, R>, done: Completion<A, R>)
    where
        A: Serialize + Send + 'static,
        R: DeserializeOwned + Send + 'static;
}

/// Shared RPC context: the shutdown signal plus a source of connections.
pub trait RpcContext: Send + Sync + 'static {
    type Conn: Connection;

    fn stopper(&self) -> &Stopper;

    /// Get (or lazily create) the handle for `addr`. Never blocks; link setup
    /// happens behind the handle's signals.
    fn client(&self, addr: &NetworkAddress) -> Arc<Self::Conn>;
}

/// Creates connection handles for [`Context`].
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    fn connect(&self, addr: &NetworkAddress) -> Arc<Self::Conn>;
}

/// Default [`RpcContext`]: one cached handle per address.
///
/// A cached handle is reused until it reports closed; the next acquisition
/// after that gets a fresh handle from the connector. Entries are not evicted
/// on their own: when nodes move, the owner prunes stale addresses with
/// [`remove`](Self::remove) or drops dead handles with
/// [`retain_open`](Self::retain_open).
pub struct Context<K: Connector> {
    stopper: Stopper,
    connector: K,
    clients: DashMap<NetworkAddress, Arc<K::Conn>>,
}

impl<K: Connector> Context<K> {
    pub fn new(connector: K, stopper: Stopper) -> Self {
        Self {
            stopper,
            connector,
            clients: DashMap::new(),
        }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Number of cached handles (closed ones included until replaced).
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Forget the handle for `addr`. Callers already holding it keep it.
    pub fn remove(&self, addr: &NetworkAddress) -> Option<Arc<K::Conn>> {
        self.clients.remove(addr).map(|(_, client)| client)
    }

    /// Drop every cached handle that reports closed.
    ///
    /// # Returns
    /// Number of handles evicted
    pub fn retain_open(&self) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, client| !client.is_closed());
        let evicted = before.saturating_sub(self.clients.len());
        if evicted > 0 {
            debug!(evicted, "evicted closed clients");
        }
        evicted
    }
}

impl<K: Connector> RpcContext for Context<K> {
    type Conn = K::Conn;

    fn stopper(&self) -> &Stopper {
        &self.stopper
    }

    fn client(&self, addr: &NetworkAddress) -> Arc<K::Conn> {
        match self.clients.entry(addr.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    debug!(%addr, "replacing closed client");
                    entry.insert(self.connector.connect(addr));
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                debug!(%addr, "creating client");
                let client = self.connector.connect(addr);
                entry.insert(Arc::clone(&client));
                client
            }
        }
    }
}

impl<K: Connector> fmt::Debug for Context<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("stopping", &self.stopper.is_stopping())
            .field("clients", &self.clients.len())
            .finish()
    }
}
