//! Flat key-value storage the document layer is built on.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐   get/set/remove   ┌──────────────────────────┐
//! │ DocumentStore│ ─────────────────► │ dyn KeyValueStore        │
//! └──────────────┘   String → String  │  ├─ MemoryStorage (BTree)│
//!                                     │  └─ RocksStorage (CF kv) │
//!                                     └──────────────────────────┘
//! ```
//!
//! Values are opaque strings; the document layer stores JSON in them and
//! keeps session tokens next to documents in the same keyspace.

pub mod memory;
#[cfg(feature = "rocks")]
pub mod rocks;

use std::path::PathBuf;

use crate::error::StoreError;

pub use memory::MemoryStorage;
#[cfg(feature = "rocks")]
pub use rocks::RocksStorage;

/// A flat, string-keyed, string-valued store.
///
/// Implementations must be safe to share between threads. Every method is a
/// single atomic operation on one key, except [`clear`](Self::clear).
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys yield `Ok(None)`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently stored, in ascending order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Persistent store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 32MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("nest_data"),
            block_cache_size: 32 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create a config rooted at `path` with default tuning.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.path, PathBuf::from("nest_data"));
        assert_eq!(config.bloom_filter_bits, 10);
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_store_config_at_keeps_tuning() {
        let config = StoreConfig::at("/tmp/nest");
        assert_eq!(config.path, PathBuf::from("/tmp/nest"));
        assert_eq!(config.block_cache_size, StoreConfig::default().block_cache_size);
    }
}
