//! Cancellation shared between a caller and an in-flight pull
//!
//! Built on a `tokio::sync::watch` channel: the caller keeps the
//! [`CancelHandle`], every stage of the pull observes a [`CancelToken`].
//! Blocking HTTP streaming polls [`CancelToken::is_cancelled`] between
//! chunks; async code awaits [`CancelToken::cancelled`]. File hashing is
//! not interruptible and is abandoned by the orchestrator instead.

use std::sync::Arc;
use tokio::sync::watch;

/// Sending side, owned by whoever may abort the pull
#[derive(Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Create another token observing this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
            _keep: None,
        }
    }
}

/// Receiving side, threaded through resolver, download and verify calls
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Keeps the channel open for tokens that can never fire
    _keep: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// Create a linked handle/token pair
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx: Arc::new(tx) },
            CancelToken { rx, _keep: None },
        )
    }

    /// A token that is never cancelled
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keep: Some(Arc::new(tx)),
        }
    }

    /// Check without waiting
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// If the handle is dropped without cancelling, this never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}
