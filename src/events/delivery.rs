//! Completion signal for an emitted event.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Resolves once every hand-off of one `emit` call has finished.
///
/// Dropping a `Delivery` does not cancel the hand-offs.
#[derive(Debug)]
pub struct Delivery {
    done: Option<oneshot::Receiver<()>>,
}

impl Delivery {
    /// A delivery with nothing to wait for.
    pub(crate) fn ready() -> Self {
        Self { done: None }
    }

    pub(crate) fn spawn(handles: Vec<JoinHandle<()>>) -> Self {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            for result in join_all(handles).await {
                // A panicked hand-off still counts as finished.
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Event hand-off aborted");
                }
            }
            let _ = tx.send(());
        });
        Self { done: Some(rx) }
    }

    /// True when there was nobody to deliver to.
    pub fn is_ready(&self) -> bool {
        self.done.is_none()
    }

    /// Wait until every hand-off has finished.
    pub async fn wait(self) {
        if let Some(rx) = self.done {
            let _ = rx.await;
        }
    }

    /// Wait at most `timeout`. Returns false if some hand-off is still
    /// blocked when the timeout elapses.
    pub async fn wait_timeout(self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}
