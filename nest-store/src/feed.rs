//! Async change feed: every document write fanned out to tokio watchers.
//!
//! Uses a tokio broadcast channel for O(1) publish to all watchers. Each
//! watcher gets an independent receiver that buffers up to `capacity`
//! changes; a slower watcher lags and skips rather than blocking writers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::document::Document;
use crate::listeners::DocumentSnapshot;

/// Feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Changes buffered per watcher before it starts lagging (default: 256)
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// One committed write. `data` is `None` for deletions.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub collection: String,
    pub doc_id: String,
    pub data: Option<Document>,
}

impl DocumentChange {
    pub fn is_for(&self, collection: &str, doc_id: &str) -> bool {
        self.collection == collection && self.doc_id == doc_id
    }

    pub fn to_snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot::new(self.collection.clone(), self.doc_id.clone(), self.data.clone())
    }
}

impl From<&DocumentSnapshot> for DocumentChange {
    fn from(snapshot: &DocumentSnapshot) -> Self {
        Self {
            collection: snapshot.collection().to_string(),
            doc_id: snapshot.doc_id().to_string(),
            data: snapshot.data().cloned(),
        }
    }
}

/// Statistics for monitoring feed health.
#[derive(Debug, Clone, Default)]
pub struct FeedStats {
    pub changes_published: u64,
    pub active_watchers: usize,
}

/// Broadcast of document changes.
pub struct ChangeFeed {
    sender: broadcast::Sender<Arc<DocumentChange>>,
    capacity: usize,
    /// Lock-free publish counter
    published: AtomicU64,
}

impl ChangeFeed {
    pub fn new(config: FeedConfig) -> Self {
        let capacity = config.capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            published: AtomicU64::new(0),
        }
    }

    /// Publish a change. Returns how many watchers will see it; zero
    /// watchers is not an error.
    pub fn publish(&self, change: DocumentChange) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(Arc::new(change)).unwrap_or(0)
    }

    /// Raw receiver for every change published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DocumentChange>> {
        self.sender.subscribe()
    }

    /// Watcher filtered to a single document.
    pub fn watch_doc(&self, collection: &str, doc_id: &str) -> DocumentWatcher {
        DocumentWatcher {
            receiver: self.sender.subscribe(),
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
        }
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            changes_published: self.published.load(Ordering::Relaxed),
            active_watchers: self.sender.receiver_count(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Async watcher for one document.
pub struct DocumentWatcher {
    receiver: broadcast::Receiver<Arc<DocumentChange>>,
    collection: String,
    doc_id: String,
}

impl DocumentWatcher {
    /// Wait for the next change to the watched document.
    ///
    /// Returns `None` once the store (and with it the feed) is gone.
    pub async fn changed(&mut self) -> Option<DocumentSnapshot> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.is_for(&self.collection, &self.doc_id) => {
                    return Some(change.to_snapshot());
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!(
                        "Watcher on {}/{} lagged by {n} changes",
                        self.collection,
                        self.doc_id
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(collection: &str, doc_id: &str, data: Option<serde_json::Value>) -> DocumentChange {
        DocumentChange {
            collection: collection.into(),
            doc_id: doc_id.into(),
            data: data.and_then(|v| v.as_object().cloned()),
        }
    }

    #[tokio::test]
    async fn test_publish_without_watchers() {
        let feed = ChangeFeed::new(FeedConfig::default());
        assert_eq!(feed.publish(change("users", "812", None)), 0);
        assert_eq!(feed.stats().changes_published, 1);
        assert_eq!(feed.stats().active_watchers, 0);
    }

    #[tokio::test]
    async fn test_watch_doc_filters() {
        let feed = ChangeFeed::new(FeedConfig::default());
        let mut watcher = feed.watch_doc("users", "917");

        feed.publish(change("users", "812", Some(json!({"name": "a"}))));
        feed.publish(change("users", "917", Some(json!({"name": "b"}))));

        let snap = watcher.changed().await.unwrap();
        assert_eq!(snap.doc_id(), "917");
        assert_eq!(snap.get("name"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn test_watcher_survives_lag() {
        let feed = ChangeFeed::new(FeedConfig { capacity: 2 });
        let mut watcher = feed.watch_doc("timesToDo", "812_917");

        for i in 0..5 {
            feed.publish(change("timesToDo", "812_917", Some(json!({"n": i}))));
        }

        // The oldest changes were overwritten; the watcher resumes at the newest kept
        let snap = watcher.changed().await.unwrap();
        assert_eq!(snap.get("n"), Some(&json!(3)));
        let snap = watcher.changed().await.unwrap();
        assert_eq!(snap.get("n"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_watcher_closed_when_feed_dropped() {
        let feed = ChangeFeed::new(FeedConfig::default());
        let mut watcher = feed.watch_doc("users", "812");
        drop(feed);
        assert!(watcher.changed().await.is_none());
    }

    #[test]
    fn test_feed_capacity_floor() {
        let feed = ChangeFeed::new(FeedConfig { capacity: 0 });
        assert_eq!(feed.capacity(), 1);
    }
}
