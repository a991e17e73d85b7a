use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::product::ProductRecord;

/// Snapshots buffered between the listener task and its consumer.
const SUBSCRIPTION_BUFFER: usize = 16;

/// A live feed of full-collection snapshots.
///
/// Dropping the subscription, or calling [`Subscription::unsubscribe`],
/// cancels the listener. Ownership guarantees it happens once.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Vec<ProductRecord>>,
    cancel: CancellationToken,
}

/// Producer half, held by the listener task.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    tx: mpsc::Sender<Vec<ProductRecord>>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn channel() -> (SnapshotFeed, Subscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        (
            SnapshotFeed {
                tx,
                cancel: cancel.clone(),
            },
            Subscription { rx, cancel },
        )
    }

    /// Next snapshot, or `None` once the listener has stopped.
    pub async fn recv(&mut self) -> Option<Vec<ProductRecord>> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SnapshotFeed {
    /// Deliver a snapshot. `false` once the consumer is gone.
    pub async fn send(&self, records: Vec<ProductRecord>) -> bool {
        self.tx.send(records).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the consumer unsubscribes.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
