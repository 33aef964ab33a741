use thiserror::Error;

/// Errors raised by the storage backends and the document layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend (RocksDB) failure
    #[error("Database error: {0}")]
    Database(String),

    /// A document body could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is not a JSON object
    #[error("Corrupt document at key '{key}'")]
    Corrupt { key: String },

    /// A typed value did not serialize to a JSON object
    #[error("Document {collection}/{doc_id} must be a JSON object")]
    NotAnObject { collection: String, doc_id: String },

    /// An internal lock was poisoned by a panicking thread
    #[error("Store lock poisoned")]
    LockPoisoned,
}

#[cfg(feature = "rocks")]
impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
