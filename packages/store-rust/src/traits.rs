use async_trait::async_trait;
use dsorm_core::{Key, StorageRow};

/// Pluggable backing store for entities.
/// Implementations: in-memory (tests, demo); network-backed stores live outside this crate.
///
/// Each call is treated as one blocking, all-or-nothing operation. Timeouts,
/// retries and cancellation are the implementation's concern.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch rows by key. Returns exactly one slot per input key, in input
    /// order; `None` marks a key with no stored row.
    async fn get(&self, keys: &[Key]) -> anyhow::Result<Vec<Option<StorageRow>>>;

    /// Insert or replace rows. Returns the stored keys in input order.
    async fn put(&self, rows: Vec<StorageRow>) -> anyhow::Result<Vec<Key>>;

    /// Delete rows by key. Deleting a missing key is not an error.
    async fn delete(&self, keys: &[Key]) -> anyhow::Result<()>;
}
