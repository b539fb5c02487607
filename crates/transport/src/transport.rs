//! Node-addressed RPC transport.
//!
//! Sends one RPC to one predetermined node, bypassing key routing. Used by
//! the replication layer for Raft traffic and by maintenance work such as
//! purging a replica after rebalancing, where only one target is valid.
//!
//! # Algorithm
//!
//! 1. Resolve the node ID to an address through the membership service
//! 2. Acquire the shared connection handle for that address
//! 3. Wait for the first of: shutdown, connection closed, connection ready
//! 4. Refuse unhealthy connections
//! 5. Invoke, blocking or posting to a completion sink
//!
//! Steps 1-4 fail before anything reaches the peer and are never retried
//! here. Once past step 3 the send runs to completion even if shutdown is
//! requested afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use corelib::NodeId;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::client::{Call, Completion, Connection, RpcContext};
use crate::error::TransportError;
use crate::gossip::AddressResolver;

/// How the outcome of a send is delivered.
pub enum Dispatch<'r, A, R> {
    /// Block until the remote call completes; `reply` is written on success.
    Sync { reply: &'r mut R },
    /// Return once dispatched; the completed [`Call`] (carrying `reply`) is
    /// posted on `done`.
    Async { reply: R, done: Completion<A, R> },
}

impl<A, R> Dispatch<'_, A, R> {
    fn mode(&self) -> &'static str {
        match self {
            Dispatch::Sync { .. } => "sync",
            Dispatch::Async { .. } => "async",
        }
    }
}

/// Directs RPCs to nodes by ID.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `method` with `args` on node `node_id`.
    ///
    /// Local failures (resolution, shutdown, connection, health) are always
    /// returned from this call, in both dispatch modes. A remote failure is
    /// returned here in [`Dispatch::Sync`] mode and carried on the completed
    /// call in [`Dispatch::Async`] mode.
    async fn send<'r, A, R>(
        &self,
        node_id: NodeId,
        method: &str,
        args: A,
        dispatch: Dispatch<'r, A, R>,
    ) -> Result<(), TransportError>
    where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static;
}

/// `None` is a transport that was never wired up: every send fails with
/// [`TransportError::Unavailable`] without consulting anything.
#[async_trait]
impl<T: Transport> Transport for Option<T> {
    async fn send<'r, A, R>(
        &self,
        node_id: NodeId,
        method: &str,
        args: A,
        dispatch: Dispatch<'r, A, R>,
    ) -> Result<(), TransportError>
    where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        match self {
            Some(transport) => transport.send(node_id, method, args, dispatch).await,
            None => Err(failed(
                node_id,
                method,
                TransportError::Unavailable {
                    method: method.to_string(),
                },
            )),
        }
    }
}

/// [`Transport`] that resolves addresses through gossip and sends over the
/// RPC context's shared connections.
pub struct RpcTransport<G, C> {
    gossip: Arc<G>,
    context: Arc<C>,
}

impl<G: AddressResolver, C: RpcContext> RpcTransport<G, C> {
    pub fn new(gossip: Arc<G>, context: Arc<C>) -> Self {
        Self { gossip, context }
    }

    pub fn gossip(&self) -> &Arc<G> {
        &self.gossip
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }
}

impl<G, C> Clone for RpcTransport<G, C> {
    fn clone(&self) -> Self {
        Self {
            gossip: Arc::clone(&self.gossip),
            context: Arc::clone(&self.context),
        }
    }
}

#[async_trait]
impl<G: AddressResolver, C: RpcContext> Transport for RpcTransport<G, C> {
    async fn send<'r, A, R>(
        &self,
        node_id: NodeId,
        method: &str,
        args: A,
        dispatch: Dispatch<'r, A, R>,
    ) -> Result<(), TransportError>
    where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let addr = match self.gossip.resolve(node_id).await {
            Ok(addr) => addr,
            Err(source) => {
                return Err(failed(
                    node_id,
                    method,
                    TransportError::AddressResolution { node_id, source },
                ))
            }
        };

        let client = self.context.client(&addr);

        // Ties resolve in declaration order.
        tokio::select! {
            biased;
            _ = self.context.stopper().should_stop() => {
                return Err(failed(node_id, method, TransportError::Aborted {
                    method: method.to_string(),
                }));
            }
            _ = client.closed() => {
                return Err(failed(node_id, method, TransportError::ConnectionFailed { node_id }));
            }
            _ = client.ready() => {}
        }

        if !client.is_healthy() {
            return Err(failed(node_id, method, TransportError::Unhealthy { node_id }));
        }

        trace!(%node_id, %addr, method, mode = dispatch.mode(), "dispatching");
        counter!("transport.send.dispatched", "mode" => dispatch.mode()).increment(1);

        match dispatch {
            Dispatch::Sync { reply } => client.call(method, &args, reply).await.map_err(|err| {
                debug!(%node_id, method, error = %err, "remote call failed");
                TransportError::Remote(err)
            }),
            Dispatch::Async { reply, done } => {
                client.go(Call::new(method, args, reply), done);
                Ok(())
            }
        }
    }
}

/// Record a local send failure.
fn failed(node_id: NodeId, method: &str, err: TransportError) -> TransportError {
    match &err {
        TransportError::Aborted { .. } => debug!(%node_id, method, "{}", err),
        _ => warn!(%node_id, method, "{}", err),
    }
    counter!("transport.send.failed", "reason" => err.reason()).increment(1);
    err
}
