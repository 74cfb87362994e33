//! In-memory store backend.

use crate::error::{Result, TableError};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::Store;

/// A map guarded by a single reader/writer lock.
#[derive(Debug, Default)]
pub struct MemStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `entries`. Later duplicates win.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of the current keys, in no particular order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.entries.read().keys().cloned().collect()
    }
}

impl Store for MemStore {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or(TableError::NotFound)
    }

    fn del(&self, key: &[u8]) -> Result<()> {
        match self.entries.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(TableError::NotFound),
        }
    }
}
