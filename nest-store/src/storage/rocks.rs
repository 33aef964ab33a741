//! RocksDB-backed persistent key-value store.
//!
//! Column families:
//! - `kv`: every key of the flat keyspace (documents, tokens), UTF-8 values
//!
//! Values are small JSON documents read by point lookup, so the column family
//! is tuned for point lookups with bloom filters and an LRU block cache.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use std::path::Path;

use super::{KeyValueStore, StoreConfig};
use crate::error::StoreError;

/// Column family holding the flat keyspace.
const CF_KV: &str = "kv";

/// Persistent backend. Data survives process restarts.
pub struct RocksStorage {
    /// RocksDB instance (single-threaded mode; column families are fixed at open)
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksStorage {
    /// Open the store at the configured path, creating it if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf = ColumnFamilyDescriptor::new(CF_KV, Self::cf_options(&config));
        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            vec![cf],
        )?;

        log::info!("Opened RocksDB key-value store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(2);
        opts.optimize_for_point_lookup(config.block_cache_size as u64);
        opts
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_cf(self.cf()?)?;
        Ok(())
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_KV)
            .ok_or_else(|| StoreError::Database(format!("Column family '{CF_KV}' not found")))
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    fn decode_key(key: &[u8]) -> Result<String, StoreError> {
        String::from_utf8(key.to_vec()).map_err(|_| StoreError::Corrupt {
            key: String::from_utf8_lossy(key).into_owned(),
        })
    }
}

impl KeyValueStore for RocksStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.db.get_cf(self.cf()?, key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::Corrupt { key: key.to_string() }),
            None => Ok(None),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db
            .put_cf_opt(self.cf()?, key.as_bytes(), value.as_bytes(), &self.write_options())?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.db
            .delete_cf_opt(self.cf()?, key.as_bytes(), &self.write_options())?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(self.cf()?, IteratorMode::Start) {
            let (key, _) = item?;
            keys.push(Self::decode_key(&key)?);
        }
        Ok(keys)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let cf = self.cf()?;
        let mut batch = WriteBatch::default();
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(cf, &key);
            count += 1;
        }
        if count > 0 {
            self.db.write_opt(batch, &self.write_options())?;
        }
        log::debug!("Cleared {count} keys from {}", self.config.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rocks_open_set_get() {
        let dir = tempdir().unwrap();
        let storage = RocksStorage::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        assert!(storage.path().exists());

        storage.set_item("doc_users_812", r#"{"name":"812"}"#).unwrap();
        assert_eq!(
            storage.get_item("doc_users_812").unwrap().as_deref(),
            Some(r#"{"name":"812"}"#)
        );
        assert_eq!(storage.get_item("doc_users_917").unwrap(), None);
    }

    #[test]
    fn test_rocks_remove_and_clear() {
        let dir = tempdir().unwrap();
        let storage = RocksStorage::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

        for key in ["a", "b", "c"] {
            storage.set_item(key, "1").unwrap();
        }
        storage.remove_item("b").unwrap();
        storage.remove_item("missing").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["a", "c"]);

        storage.clear().unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_rocks_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::for_testing(dir.path().join("db"));

        {
            let storage = RocksStorage::open(config.clone()).unwrap();
            storage.set_item("userToken", "917").unwrap();
            storage.flush().unwrap();
        }

        let storage = RocksStorage::open(config).unwrap();
        assert_eq!(storage.get_item("userToken").unwrap().as_deref(), Some("917"));
    }
}
