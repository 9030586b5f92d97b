//! Shutdown signalling for sync sessions.

use std::sync::Arc;
use tokio::sync::watch;

/// Requests shutdown of a running session. Cloneable and usable from any
/// task or thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// The receiving side, awaited by the engine.
#[derive(Debug, Clone)]
pub(crate) struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// Completes once cancellation is requested. Never completes if every
    /// handle is dropped without cancelling.
    pub(crate) async fn cancelled(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Creates a connected handle/token pair.
pub(crate) fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle {
            sender: Arc::new(sender),
        },
        CancelToken { receiver },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_completes_after_cancel() {
        let (handle, mut token) = cancel_pair();
        assert!(!handle.is_cancelled());

        let remote = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            remote.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("token should observe cancellation");
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_token_returns_immediately() {
        let (handle, mut token) = cancel_pair();
        handle.cancel();
        handle.cancel();
        token.cancelled().await;
    }
}
