//! Collection / document reference facade over [`DocumentStore`].
//!
//! ```text
//! db.collection("anniversaries").add(data)      → generated id
//! db.doc("users", "812").update(data)           → shallow merge
//! db.doc("chats", pair).on_snapshot(|snap| …)   → Subscription
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::document::{Document, DocumentStore};
use crate::error::StoreError;
use crate::feed::DocumentWatcher;
use crate::listeners::{DocumentSnapshot, Subscription};
use crate::storage::KeyValueStore;

/// Entry point handed to application services. Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    store: Arc<DocumentStore>,
}

impl Database {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Database over a fresh document store on `storage`.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::new(Arc::new(DocumentStore::new(storage)))
    }

    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef {
            store: self.store.clone(),
            name: name.to_string(),
        }
    }

    pub fn doc(&self, collection: &str, doc_id: &str) -> DocRef {
        DocRef {
            store: self.store.clone(),
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
        }
    }

    pub fn get_doc(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        doc.get()
    }

    pub fn set_doc(&self, doc: &DocRef, data: Document) -> Result<(), StoreError> {
        doc.set(data)
    }

    pub fn update_doc(&self, doc: &DocRef, data: Document) -> Result<(), StoreError> {
        doc.update(data)
    }

    pub fn on_snapshot<F>(&self, doc: &DocRef, callback: F) -> Subscription
    where
        F: Fn(&DocumentSnapshot) + Send + Sync + 'static,
    {
        doc.on_snapshot(callback)
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }
}

/// Reference to a collection.
#[derive(Clone)]
pub struct CollectionRef {
    store: Arc<DocumentStore>,
    name: String,
}

impl CollectionRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a document under a generated id.
    pub fn add(&self, data: Document) -> Result<String, StoreError> {
        self.store.add_doc(&self.name, data)
    }

    /// Read the collection array.
    pub fn get(&self) -> Result<Vec<Value>, StoreError> {
        self.store.get_collection(&self.name)
    }

    pub fn doc(&self, doc_id: &str) -> DocRef {
        DocRef {
            store: self.store.clone(),
            collection: self.name.clone(),
            doc_id: doc_id.to_string(),
        }
    }
}

/// Reference to one document.
#[derive(Clone)]
pub struct DocRef {
    store: Arc<DocumentStore>,
    collection: String,
    doc_id: String,
}

impl DocRef {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.doc_id
    }

    pub fn get(&self) -> Result<Option<Document>, StoreError> {
        self.store.get_doc(&self.collection, &self.doc_id)
    }

    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        self.store.get_doc_as(&self.collection, &self.doc_id)
    }

    pub fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.get()?.is_some())
    }

    pub fn set(&self, data: Document) -> Result<(), StoreError> {
        self.store.set_doc(&self.collection, &self.doc_id, data)
    }

    pub fn set_as<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        self.store.set_doc_as(&self.collection, &self.doc_id, value)
    }

    pub fn update(&self, data: Document) -> Result<(), StoreError> {
        self.store.update_doc(&self.collection, &self.doc_id, data)
    }

    pub fn update_as<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        self.store.update_doc_as(&self.collection, &self.doc_id, value)
    }

    pub fn delete(&self) -> Result<(), StoreError> {
        self.store.delete_doc(&self.collection, &self.doc_id)
    }

    pub fn on_snapshot<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DocumentSnapshot) + Send + Sync + 'static,
    {
        self.store.on_snapshot(&self.collection, &self.doc_id, callback)
    }

    pub fn watch(&self) -> DocumentWatcher {
        self.store.watch_doc(&self.collection, &self.doc_id)
    }
}

impl std::fmt::Debug for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocRef({}/{})", self.collection, self.doc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::Mutex;

    fn obj(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn db() -> Database {
        Database::open(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_doc_ref_roundtrip() {
        let db = db();
        let doc = db.doc("users", "812");
        assert_eq!(doc.collection(), "users");
        assert_eq!(doc.id(), "812");
        assert!(!doc.exists().unwrap());

        doc.set(obj(json!({"name": "a", "shoutout": "x"}))).unwrap();
        doc.update(obj(json!({"shoutout": "y"}))).unwrap();
        assert_eq!(
            db.get_doc(&doc).unwrap(),
            Some(obj(json!({"name": "a", "shoutout": "y"})))
        );

        doc.delete().unwrap();
        assert!(!doc.exists().unwrap());
    }

    #[test]
    fn test_collection_ref_add_and_doc() {
        let db = db();
        let anniversaries = db.collection("anniversaries");
        let id = anniversaries.add(obj(json!({"title": "first date"}))).unwrap();

        let doc = anniversaries.doc(&id);
        assert_eq!(doc.get().unwrap(), Some(obj(json!({"title": "first date"}))));
        // The collection array is independent of added documents
        assert!(anniversaries.get().unwrap().is_empty());
    }

    #[test]
    fn test_refs_share_listeners() {
        let db = db();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = db.on_snapshot(&db.doc("users", "917"), move |snap| {
            s.lock().unwrap().push(snap.exists());
        });

        db.collection("users").doc("917").set(obj(json!({}))).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }
}
