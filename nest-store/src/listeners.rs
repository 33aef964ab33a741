//! Per-document snapshot subscriptions with synchronous fan-out.
//!
//! Listeners are keyed `{collection}_{docId}`, the same composite the storage
//! key is built from, so two references that alias one stored document also
//! share its listeners.
//!
//! ```text
//! set_doc / update_doc / delete_doc
//!       │  (after the storage write succeeds)
//!       ▼
//! ListenerRegistry::notify()
//!       │  clone callback list, release lock
//!       ▼
//! cb₁(&snapshot)  cb₂(&snapshot)  …   (registration order, panics caught)
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde_json::Value;

use crate::document::Document;

/// The state of one document at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    collection: String,
    doc_id: String,
    data: Option<Document>,
}

impl DocumentSnapshot {
    pub fn new(collection: impl Into<String>, doc_id: impl Into<String>, data: Option<Document>) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            data,
        }
    }

    /// Snapshot of a document that does not exist.
    pub fn missing(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self::new(collection, doc_id, None)
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&Document> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Document> {
        self.data
    }

    /// Read one top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(field))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

type Callback = Arc<dyn Fn(&DocumentSnapshot) + Send + Sync>;

struct RegistryInner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(u64, Callback)>>>,
}

impl RegistryInner {
    fn remove(&self, key: &str, id: u64) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(key);
        }
        removed
    }
}

/// In-memory registry of snapshot callbacks.
///
/// Cloning shares the registry.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                listeners: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Registry key for a document.
    pub fn listener_key(collection: &str, doc_id: &str) -> String {
        format!("{collection}_{doc_id}")
    }

    /// Register a callback for one document.
    ///
    /// The returned [`Subscription`] removes the callback when dropped.
    pub fn register<F>(&self, collection: &str, doc_id: &str, callback: F) -> Subscription
    where
        F: Fn(&DocumentSnapshot) + Send + Sync + 'static,
    {
        let key = Self::listener_key(collection, doc_id);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut listeners = self.inner.listeners.write().unwrap_or_else(PoisonError::into_inner);
            listeners
                .entry(key.clone())
                .or_default()
                .push((id, Arc::new(callback)));
        }
        log::debug!("Listener {id} registered on {key}");
        Subscription {
            registry: Arc::downgrade(&self.inner),
            key,
            id,
            active: true,
        }
    }

    /// Deliver `snapshot` to every callback registered for its document.
    ///
    /// Returns the number of callbacks invoked. A panicking callback is
    /// logged and does not stop the others.
    pub fn notify(&self, snapshot: &DocumentSnapshot) -> usize {
        let key = Self::listener_key(snapshot.collection(), snapshot.doc_id());
        let callbacks: Vec<Callback> = {
            let listeners = self.inner.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(&key) {
                Some(entries) => entries.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return 0,
            }
        };

        for callback in &callbacks {
            invoke(callback.as_ref(), snapshot);
        }
        callbacks.len()
    }

    /// Number of callbacks registered for a document.
    pub fn listener_count(&self, collection: &str, doc_id: &str) -> usize {
        let key = Self::listener_key(collection, doc_id);
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map_or(0, Vec::len)
    }

    /// Keys of all documents with at least one listener, sorted.
    pub fn watched_documents(&self) -> Vec<String> {
        let listeners = self.inner.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = listeners.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Run one callback, containing any panic it raises.
pub(crate) fn invoke(callback: &(dyn Fn(&DocumentSnapshot) + Send + Sync), snapshot: &DocumentSnapshot) {
    if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
        log::error!(
            "Listener callback panicked for {}/{}",
            snapshot.collection(),
            snapshot.doc_id()
        );
    }
}

/// Handle returned by a snapshot subscription.
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    key: String,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Remove the callback. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.registry.upgrade() {
            if inner.remove(&self.key, self.id) {
                log::debug!("Listener {} removed from {}", self.id, self.key);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Registry key this subscription listens on.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_register_and_notify_in_order() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        let _a = registry.register("users", "812", move |_| s1.lock().unwrap().push("a"));
        let s2 = seen.clone();
        let _b = registry.register("users", "812", move |_| s2.lock().unwrap().push("b"));

        let snap = DocumentSnapshot::new("users", "812", Some(doc(json!({"name": "x"}))));
        assert_eq!(registry.notify(&snap), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_notify_other_document_is_silent() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = hits.clone();
        let _sub = registry.register("users", "812", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.notify(&DocumentSnapshot::missing("users", "917")), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_removes_entry() {
        let registry = ListenerRegistry::new();
        let mut a = registry.register("chats", "812_917", |_| {});
        let b = registry.register("chats", "812_917", |_| {});
        assert_eq!(registry.listener_count("chats", "812_917"), 2);

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(registry.listener_count("chats", "812_917"), 1);

        drop(b);
        assert_eq!(registry.listener_count("chats", "812_917"), 0);
        assert!(registry.watched_documents().is_empty());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let _bad = registry.register("users", "917", |_| panic!("boom"));
        let h = hits.clone();
        let _good = registry.register("users", "917", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&DocumentSnapshot::missing("users", "917"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_unsubscribe_others_during_notify() {
        let registry = ListenerRegistry::new();
        let other: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = other.clone();
        let _first = registry.register("users", "812", move |_| {
            if let Some(mut sub) = slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *other.lock().unwrap() = Some(registry.register("users", "812", |_| {}));

        registry.notify(&DocumentSnapshot::missing("users", "812"));
        assert_eq!(registry.listener_count("users", "812"), 1);
    }

    #[test]
    fn test_snapshot_accessors() {
        let snap = DocumentSnapshot::new("users", "812", Some(doc(json!({"shoutout": "hi"}))));
        assert!(snap.exists());
        assert_eq!(snap.get("shoutout"), Some(&json!("hi")));
        assert_eq!(snap.collection(), "users");
        assert_eq!(snap.doc_id(), "812");

        let missing = DocumentSnapshot::missing("users", "812");
        assert!(!missing.exists());
        assert_eq!(missing.get("shoutout"), None);
    }

    #[test]
    fn test_watched_documents_sorted() {
        let registry = ListenerRegistry::new();
        let _a = registry.register("users", "917", |_| {});
        let _b = registry.register("chats", "812_917", |_| {});
        assert_eq!(registry.watched_documents(), vec!["chats_812_917", "users_917"]);
    }
}
