//! Live query subscriptions
//!
//! Stores keep a `Subscribers` registry. After every write they hand it the
//! full contents of the written collection and each subscriber on that
//! collection receives a fresh snapshot of the documents matching its filter.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Filter, StoredDocument};

/// One emitted result set of a live subscription
pub type Snapshot = Vec<StoredDocument>;

struct Subscriber {
    id: u64,
    collection: String,
    filter: Filter,
    sender: mpsc::UnboundedSender<Snapshot>,
}

/// Registry of live subscriptions held by a store
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    entries: Mutex<Vec<Subscriber>>,
}

impl Subscribers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscription and deliver its initial snapshot
    ///
    /// `documents` is the current content of the whole collection.
    pub fn register(
        self: &Arc<Self>,
        collection: &str,
        filter: Filter,
        documents: &[StoredDocument],
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        // Receiver is alive, the initial send cannot fail
        let _ = sender.send(filter.select(documents));

        self.entries().push(Subscriber {
            id,
            collection: collection.to_string(),
            filter,
            sender,
        });
        debug!(collection, subscription = id, "Subscription registered");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(self),
        }
    }

    /// Whether any subscription watches `collection`
    pub fn watches(&self, collection: &str) -> bool {
        self.entries().iter().any(|s| s.collection == collection)
    }

    /// Push a new snapshot to every subscription on `collection`
    pub fn notify(&self, collection: &str, documents: &[StoredDocument]) {
        self.entries().retain(|subscriber| {
            if subscriber.collection != collection {
                return true;
            }
            subscriber
                .sender
                .send(subscriber.filter.select(documents))
                .is_ok()
        });
    }

    /// Collections with at least one subscription
    pub fn collections(&self) -> Vec<String> {
        let mut collections: Vec<String> =
            self.entries().iter().map(|s| s.collection.clone()).collect();
        collections.sort();
        collections.dedup();
        collections
    }

    /// Drop every subscription; their streams end after pending snapshots
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut *self.entries()).len();
        debug!(closed, "Subscriptions closed");
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|s| s.id != id);
        debug!(subscription = id, "Subscription removed");
    }
}

/// Handle to a live subscription
///
/// Yields a full snapshot on every change. Dropping the handle, or calling
/// `unsubscribe`, releases it.
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    registry: Weak<Subscribers>,
}

impl Subscription {
    /// Wait for the next snapshot, `None` once the store has gone away
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// The next snapshot if one is already waiting
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.receiver.try_recv().ok()
    }

    /// Release the subscription
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
