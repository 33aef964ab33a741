//! Document-store emulation over a flat key-value store.
//!
//! Key layout:
//! - `doc_{collection}_{docId}`: one JSON object per document
//! - `collection_{collection}`: optional JSON array read by `get_collection`
//!
//! Every successful write is published on the async change feed at once, in
//! storage order, and then handed to the synchronous listeners. Listener
//! delivery is FIFO across the whole store: a write made from inside a
//! callback is queued and delivered after the snapshot being delivered, so
//! the last snapshot every listener sees matches storage. A failed storage
//! write returns the error and notifies nobody.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::feed::{ChangeFeed, DocumentChange, DocumentWatcher, FeedConfig, FeedStats};
use crate::listeners::{self, DocumentSnapshot, ListenerRegistry, Subscription};
use crate::storage::KeyValueStore;

/// A document body: a JSON object.
pub type Document = Map<String, Value>;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Snapshots waiting for listener delivery.
#[derive(Default)]
struct Delivery {
    pending: VecDeque<DocumentSnapshot>,
    /// Set while some call is draining `pending`
    delivering: bool,
}

/// The document store.
///
/// Shared via `Arc`; all methods take `&self`.
pub struct DocumentStore {
    storage: Arc<dyn KeyValueStore>,
    listeners: ListenerRegistry,
    feed: ChangeFeed,
    delivery: Mutex<Delivery>,
}

impl DocumentStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_feed_config(storage, FeedConfig::default())
    }

    pub fn with_feed_config(storage: Arc<dyn KeyValueStore>, feed: FeedConfig) -> Self {
        Self {
            storage,
            listeners: ListenerRegistry::new(),
            feed: ChangeFeed::new(feed),
            delivery: Mutex::new(Delivery::default()),
        }
    }

    /// Storage key of a document.
    pub fn doc_key(collection: &str, doc_id: &str) -> String {
        format!("doc_{collection}_{doc_id}")
    }

    /// Storage key read by [`get_collection`](Self::get_collection).
    pub fn collection_key(collection: &str) -> String {
        format!("collection_{collection}")
    }

    /// Generate a document id: `{unix_millis}_{9 base-36 chars}`.
    pub fn generate_doc_id() -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        format!("{millis}_{suffix}")
    }

    // ─── Reads ────────────────────────────────────────────────────────

    /// Fetch a whole document. Missing documents yield `Ok(None)`.
    pub fn get_doc(&self, collection: &str, doc_id: &str) -> Result<Option<Document>, StoreError> {
        let key = Self::doc_key(collection, doc_id);
        let Some(raw) = self.storage.get_item(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(doc) => Ok(Some(doc)),
            _ => Err(StoreError::Corrupt { key }),
        }
    }

    /// Fetch a document and deserialize it.
    pub fn get_doc_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get_doc(collection, doc_id)? {
            Some(doc) => Ok(Some(serde_json::from_value(Value::Object(doc))?)),
            None => Ok(None),
        }
    }

    /// Read the `collection_{name}` array. Missing yields an empty list.
    pub fn get_collection(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let key = Self::collection_key(collection);
        match self.storage.get_item(&key)? {
            Some(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Array(items) => Ok(items),
                _ => Err(StoreError::Corrupt { key }),
            },
            None => Ok(Vec::new()),
        }
    }

    // ─── Writes ───────────────────────────────────────────────────────

    /// Overwrite a whole document.
    pub fn set_doc(&self, collection: &str, doc_id: &str, data: Document) -> Result<(), StoreError> {
        let key = Self::doc_key(collection, doc_id);
        let raw = serde_json::to_string(&data)?;
        self.storage.set_item(&key, &raw)?;
        log::debug!("set {key} ({} bytes)", raw.len());
        self.publish(DocumentSnapshot::new(collection, doc_id, Some(data)));
        Ok(())
    }

    /// Serialize `value` and overwrite a whole document with it.
    pub fn set_doc_as<T: Serialize>(&self, collection: &str, doc_id: &str, value: &T) -> Result<(), StoreError> {
        let data = Self::to_document(collection, doc_id, value)?;
        self.set_doc(collection, doc_id, data)
    }

    /// Shallow-merge `data` into the stored document (top-level keys of
    /// `data` win), or store `data` as-is when there is none. One
    /// notification carrying the merged document.
    pub fn update_doc(&self, collection: &str, doc_id: &str, data: Document) -> Result<(), StoreError> {
        let merged = match self.get_doc(collection, doc_id)? {
            Some(mut existing) => {
                existing.extend(data);
                existing
            }
            None => data,
        };
        self.set_doc(collection, doc_id, merged)
    }

    /// Serialize `value` and shallow-merge it into the stored document.
    pub fn update_doc_as<T: Serialize>(&self, collection: &str, doc_id: &str, value: &T) -> Result<(), StoreError> {
        let data = Self::to_document(collection, doc_id, value)?;
        self.update_doc(collection, doc_id, data)
    }

    /// Delete a document. Listeners are told it no longer exists, even if it
    /// never did.
    pub fn delete_doc(&self, collection: &str, doc_id: &str) -> Result<(), StoreError> {
        let key = Self::doc_key(collection, doc_id);
        self.storage.remove_item(&key)?;
        log::debug!("deleted {key}");
        self.publish(DocumentSnapshot::missing(collection, doc_id));
        Ok(())
    }

    /// Store a document under a freshly generated id and return the id.
    pub fn add_doc(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let doc_id = Self::generate_doc_id();
        self.set_doc(collection, &doc_id, data)?;
        Ok(doc_id)
    }

    // ─── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to one document.
    ///
    /// The callback runs once immediately with the current state (a missing
    /// snapshot if the read fails), then after every write to the document.
    pub fn on_snapshot<F>(&self, collection: &str, doc_id: &str, callback: F) -> Subscription
    where
        F: Fn(&DocumentSnapshot) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let registered = callback.clone();
        let subscription = self
            .listeners
            .register(collection, doc_id, move |snap| (*registered)(snap));

        let initial = match self.get_doc(collection, doc_id) {
            Ok(data) => DocumentSnapshot::new(collection, doc_id, data),
            Err(e) => {
                log::error!("Initial snapshot read failed for {collection}/{doc_id}: {e}");
                DocumentSnapshot::missing(collection, doc_id)
            }
        };
        listeners::invoke(&*callback, &initial);
        subscription
    }

    /// Number of snapshot callbacks on a document.
    pub fn listener_count(&self, collection: &str, doc_id: &str) -> usize {
        self.listeners.listener_count(collection, doc_id)
    }

    /// Listener keys of all watched documents.
    pub fn watched_documents(&self) -> Vec<String> {
        self.listeners.watched_documents()
    }

    /// Receiver for every change made through this store from now on.
    pub fn watch(&self) -> broadcast::Receiver<Arc<DocumentChange>> {
        self.feed.subscribe()
    }

    /// Async watcher for one document.
    pub fn watch_doc(&self, collection: &str, doc_id: &str) -> DocumentWatcher {
        self.feed.watch_doc(collection, doc_id)
    }

    pub fn feed_stats(&self) -> FeedStats {
        self.feed.stats()
    }

    /// The underlying key-value store (shared with session bookkeeping).
    pub fn storage(&self) -> Arc<dyn KeyValueStore> {
        self.storage.clone()
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn publish(&self, snapshot: DocumentSnapshot) {
        let watchers = self.feed.publish(DocumentChange::from(&snapshot));
        log::trace!(
            "{}/{}: {watchers} watchers",
            snapshot.collection(),
            snapshot.doc_id()
        );

        {
            let mut delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
            delivery.pending.push_back(snapshot);
            if delivery.delivering {
                // The call already draining the queue delivers this one too
                return;
            }
            delivery.delivering = true;
        }
        self.drain();
    }

    /// Deliver queued snapshots in order until the queue is empty. Callbacks
    /// run with the delivery lock released.
    fn drain(&self) {
        loop {
            let next = {
                let mut delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
                let next = delivery.pending.pop_front();
                if next.is_none() {
                    delivery.delivering = false;
                }
                next
            };
            let Some(snapshot) = next else {
                return;
            };
            let notified = self.listeners.notify(&snapshot);
            log::trace!(
                "{}/{}: {notified} listeners",
                snapshot.collection(),
                snapshot.doc_id()
            );
        }
    }

    fn to_document<T: Serialize>(collection: &str, doc_id: &str, value: &T) -> Result<Document, StoreError> {
        match serde_json::to_value(value)? {
            Value::Object(doc) => Ok(doc),
            _ => Err(StoreError::NotAnObject {
                collection: collection.to_string(),
                doc_id: doc_id.to_string(),
            }),
        }
    }
}
