use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::types::StorageValue;

/// A record as exchanged with the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRow {
    pub key: Key,
    pub fields: BTreeMap<String, StorageValue>,
    /// Field names the store must not index.
    #[serde(default)]
    pub excluded_from_index: BTreeSet<String>,
}

impl StorageRow {
    /// Creates a row with no fields.
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            key,
            fields: BTreeMap::new(),
            excluded_from_index: BTreeSet::new(),
        }
    }
}
