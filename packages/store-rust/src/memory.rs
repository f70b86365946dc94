//! In-memory [`Store`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking.
//! Suitable for development, testing, and the demo binary.

use async_trait::async_trait;
use dashmap::DashMap;
use dsorm_core::{Key, StorageRow};

use crate::traits::Store;

/// In-memory store keyed by the full entity [`Key`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: DashMap<Key, StorageRow>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Check if a key exists without returning the row.
    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        self.rows.contains_key(key)
    }

    /// Return the number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Inserts a row directly, bypassing the entity mapper.
    pub fn insert_raw(&self, row: StorageRow) {
        self.rows.insert(row.key.clone(), row);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, keys: &[Key]) -> anyhow::Result<Vec<Option<StorageRow>>> {
        Ok(keys
            .iter()
            .map(|key| self.rows.get(key).map(|row| row.value().clone()))
            .collect())
    }

    async fn put(&self, rows: Vec<StorageRow>) -> anyhow::Result<Vec<Key>> {
        Ok(rows
            .into_iter()
            .map(|row| {
                let key = row.key.clone();
                self.rows.insert(key.clone(), row);
                key
            })
            .collect())
    }

    async fn delete(&self, keys: &[Key]) -> anyhow::Result<()> {
        for key in keys {
            self.rows.remove(key);
        }
        Ok(())
    }
}
