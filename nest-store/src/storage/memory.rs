//! Volatile in-memory backend, used by tests and `--memory` sessions.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::KeyValueStore;
use crate::error::StoreError;

/// `BTreeMap` behind a `RwLock`; keys come back sorted for free.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::LockPoisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::LockPoisoned)?;
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(items.keys().cloned().collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::LockPoisoned)?;
        items.clear();
        Ok(())
    }
}
