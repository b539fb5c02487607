//! In-process connections.
//!
//! [`LocalClient`] implements [`Connection`] against a [`Registry`] of
//! handlers living in the same process. Arguments and replies still cross a
//! bincode boundary, so caller and handler types only need to agree on
//! their encoding, as they would over a socket.
//!
//! Used for single-process clusters, the CLI diagnostics, and tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use corelib::NetworkAddress;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::client::{Call, Completion, Connection, Connector};
use crate::error::RpcError;
use crate::signal::Latch;

type Handler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, RpcError> + Send + Sync>;

/// Method name to handler table.
///
/// Clones share the same table.
#[derive(Clone, Default)]
pub struct Registry {
    handlers: Arc<DashMap<String, Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `method`, replacing any previous one.
    ///
    /// An `Err(msg)` from the handler reaches the caller as
    /// [`RpcError::Server`] with `msg` unchanged.
    ///
    /// # Example
    ///
    /// ```rust
    /// use transport::Registry;
    ///
    /// let registry = Registry::new();
    /// registry.register("Node.Ping", |n: u64| Ok::<_, String>(n + 1));
    /// assert!(registry.contains("Node.Ping"));
    /// ```
    pub fn register<A, R, F>(&self, method: impl Into<String>, handler: F)
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> Result<R, String> + Send + Sync + 'static,
    {
        let erased = move |bytes: &[u8]| -> Result<Vec<u8>, RpcError> {
            let args: A = decode(bytes)?;
            let reply = handler(args).map_err(RpcError::Server)?;
            encode(&reply)
        };
        self.handlers.insert(method.into(), Arc::new(erased));
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Run the handler for `method` on encoded arguments.
    pub fn handle(&self, method: &str, args: &[u8]) -> Result<Vec<u8>, RpcError> {
        // Clone out of the map so the shard lock is not held across the handler.
        let handler = self
            .handlers
            .get(method)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;
        handler(args)
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, RpcError> {
    bincode::serialize(value).map_err(|e| RpcError::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    bincode::deserialize(bytes).map_err(|e| RpcError::Codec(e.to_string()))
}

struct Shared {
    addr: NetworkAddress,
    registry: Registry,
    ready: Latch,
    closed: Latch,
    healthy: AtomicBool,
    invocations: AtomicU64,
}

impl Shared {
    fn invoke(&self, method: &str, args: &[u8]) -> Result<Vec<u8>, RpcError> {
        if self.closed.is_fired() {
            return Err(RpcError::Shutdown);
        }
        self.invocations.fetch_add(1, Ordering::SeqCst);
        trace!(addr = %self.addr, method, "local invoke");
        self.registry.handle(method, args)
    }
}

/// A [`Connection`] to handlers in this process.
///
/// Starts neither ready nor closed and healthy. The owner drives its
/// lifecycle with [`mark_ready`](Self::mark_ready), [`close`](Self::close)
/// and [`set_healthy`](Self::set_healthy).
pub struct LocalClient {
    shared: Arc<Shared>,
}

impl LocalClient {
    pub fn new(addr: NetworkAddress, registry: Registry) -> Self {
        Self {
            shared: Arc::new(Shared {
                addr,
                registry,
                ready: Latch::new(),
                closed: Latch::new(),
                healthy: AtomicBool::new(true),
                invocations: AtomicU64::new(0),
            }),
        }
    }

    pub fn addr(&self) -> &NetworkAddress {
        &self.shared.addr
    }

    pub fn mark_ready(&self) {
        if self.shared.ready.fire() {
            debug!(addr = %self.shared.addr, "client ready");
        }
    }

    /// Permanently close the connection. In-flight and later calls fail with
    /// [`RpcError::Shutdown`].
    pub fn close(&self) {
        if self.shared.closed.fire() {
            debug!(addr = %self.shared.addr, "client closed");
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.shared.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of calls that reached the handler registry.
    pub fn invocations(&self) -> u64 {
        self.shared.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for LocalClient {
    async fn ready(&self) {
        self.shared.ready.fired().await
    }

    async fn closed(&self) {
        self.shared.closed.fired().await
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.is_fired()
    }

    fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::SeqCst)
    }

    async fn call<A, R>(&self, method: &str, args: &A, reply: &mut R) -> Result<(), RpcError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let request = encode(args)?;
        let response = self.shared.invoke(method, &request)?;
        *reply = decode(&response)?;
        Ok(())
    }

    fn go<A, R>(&self, mut call: Call<A, R>, done: Completion<A, R>)
    where
        A: Serialize + Send + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = encode(&call.args)
                .and_then(|request| shared.invoke(&call.method, &request))
                .and_then(|response| decode::<R>(&response));
            match outcome {
                Ok(reply) => call.reply = reply,
                Err(err) => call.error = Some(err),
            }
            if done.send(call).is_err() {
                trace!(addr = %shared.addr, "completion receiver dropped");
            }
        });
    }
}

/// [`Connector`] for a single-process cluster.
///
/// Addresses with a registry attached via [`serve`](Self::serve) get clients
/// that are ready at once; any other address gets a client that is already
/// closed, as a refused dial would.
#[derive(Clone, Default)]
pub struct LocalConnector {
    servers: Arc<DashMap<NetworkAddress, Registry>>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `registry` at `addr`.
    pub fn serve(&self, addr: NetworkAddress, registry: Registry) {
        self.servers.insert(addr, registry);
    }

    /// Stop serving `addr`. Existing clients are not affected.
    pub fn unserve(&self, addr: &NetworkAddress) {
        self.servers.remove(addr);
    }
}

impl Connector for LocalConnector {
    type Conn = LocalClient;

    fn connect(&self, addr: &NetworkAddress) -> Arc<LocalClient> {
        match self.servers.get(addr) {
            Some(registry) => {
                let client = LocalClient::new(addr.clone(), registry.value().clone());
                client.mark_ready();
                Arc::new(client)
            }
            None => {
                let client = LocalClient::new(addr.clone(), Registry::new());
                client.close();
                Arc::new(client)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Context, RpcContext};
    use crate::signal::Stopper;
    use tokio::sync::mpsc;

    fn addr(port: u16) -> NetworkAddress {
        NetworkAddress::new("127.0.0.1", port)
    }

    fn echo_registry() -> Registry {
        let registry = Registry::new();
        registry.register("Echo.Upper", |s: String| Ok::<_, String>(s.to_uppercase()));
        registry.register("Echo.Fail", |_: String| Err::<String, _>("boom".to_string()));
        registry
    }

    #[test]
    fn test_registry_unknown_method() {
        let registry = Registry::new();
        assert_eq!(
            registry.handle("Nope.Nope", &[]),
            Err(RpcError::UnknownMethod("Nope.Nope".into()))
        );
    }

    #[tokio::test]
    async fn test_call_populates_reply_on_success() {
        let client = LocalClient::new(addr(1), echo_registry());
        let mut reply = String::new();
        client
            .call("Echo.Upper", &"raft".to_string(), &mut reply)
            .await
            .unwrap();
        assert_eq!(reply, "RAFT");
        assert_eq!(client.invocations(), 1);
    }

    #[tokio::test]
    async fn test_call_leaves_reply_on_failure() {
        let client = LocalClient::new(addr(1), echo_registry());
        let mut reply = "untouched".to_string();
        let err = client
            .call("Echo.Fail", &"x".to_string(), &mut reply)
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Server("boom".into()));
        assert_eq!(reply, "untouched");
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let client = LocalClient::new(addr(1), echo_registry());
        client.close();
        let mut reply = String::new();
        let err = client
            .call("Echo.Upper", &"x".to_string(), &mut reply)
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Shutdown);
        assert_eq!(client.invocations(), 0);
    }

    #[tokio::test]
    async fn test_go_posts_exactly_once() {
        let client = LocalClient::new(addr(1), echo_registry());
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.go(Call::new("Echo.Upper", "gc".to_string(), String::new()), tx);

        let call = rx.recv().await.expect("completion");
        assert_eq!(call.method, "Echo.Upper");
        assert_eq!(call.into_result().unwrap(), "GC");
        // Sender was moved into the task and dropped after posting.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connector_ready_for_served_closed_otherwise() {
        let connector = LocalConnector::new();
        connector.serve(addr(1), echo_registry());

        let served = connector.connect(&addr(1));
        served.ready().await;
        assert!(!served.is_closed());

        let refused = connector.connect(&addr(2));
        refused.closed().await;
        assert!(refused.is_closed());
    }

    #[test]
    fn test_context_shares_handle_per_address() {
        let connector = LocalConnector::new();
        connector.serve(addr(1), echo_registry());
        let context = Context::new(connector, Stopper::new());

        let a = context.client(&addr(1));
        let b = context.client(&addr(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(context.client_count(), 1);
    }

    #[test]
    fn test_context_replaces_closed_handle() {
        let connector = LocalConnector::new();
        connector.serve(addr(1), echo_registry());
        let context = Context::new(connector, Stopper::new());

        let first = context.client(&addr(1));
        first.close();
        let second = context.client(&addr(1));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());
        assert_eq!(context.client_count(), 1);
    }

    #[test]
    fn test_context_remove_stale_address() {
        let connector = LocalConnector::new();
        connector.serve(addr(1), echo_registry());
        connector.serve(addr(2), echo_registry());
        let context = Context::new(connector, Stopper::new());

        let old = context.client(&addr(1));
        context.client(&addr(2));
        assert_eq!(context.client_count(), 2);

        let removed = context.remove(&addr(1)).expect("cached handle");
        assert!(Arc::ptr_eq(&old, &removed));
        assert!(context.remove(&addr(1)).is_none());
        assert_eq!(context.client_count(), 1);

        // Next acquisition builds a fresh handle
        assert!(!Arc::ptr_eq(&old, &context.client(&addr(1))));
    }

    #[test]
    fn test_context_retain_open_drops_closed() {
        let connector = LocalConnector::new();
        connector.serve(addr(1), echo_registry());
        let context = Context::new(connector, Stopper::new());

        context.client(&addr(1));
        // Unserved address: handed out already closed
        context.client(&addr(2));
        context.client(&addr(3));
        assert_eq!(context.client_count(), 3);

        assert_eq!(context.retain_open(), 2);
        assert_eq!(context.client_count(), 1);
        assert_eq!(context.retain_open(), 0);
    }
}
