//! One-way signals: fired at most once, never cleared.
//!
//! [`Latch`] backs the ready/closed signals of in-process connections;
//! [`Stopper`] is the process-wide shutdown signal. Waiters that arrive after
//! either fired return immediately.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A boolean that can only go from `false` to `true`.
///
/// Clones share the same underlying signal.
#[derive(Clone, Debug)]
pub struct Latch {
    tx: Arc<watch::Sender<bool>>,
}

impl Latch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the latch. Returns `true` if this call did the transition.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch has fired.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide shutdown signal.
///
/// Handed to the RPC context at startup and consulted by every send while
/// waiting for its connection. Once stopped, stays stopped.
#[derive(Clone, Debug, Default)]
pub struct Stopper {
    token: CancellationToken,
}

impl Stopper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. a child of the node's root token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Request shutdown.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn should_stop(&self) {
        self.token.cancelled().await
    }
}
