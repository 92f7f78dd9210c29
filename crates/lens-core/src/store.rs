use crate::error::StoreError;
use async_trait::async_trait;

/// Key/value pair written by the store.
pub type Entry = (String, String);

/// Result of a guarded multi-key write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded {
    Applied,
    Rejected { current: String },
    Missing,
}

/// String key/value storage shared by the HTTP layer and the workers.
///
/// Implementations must be safe for concurrent use. Multi-key writes are
/// applied atomically: a reader sees either none or all of `entries`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Reads several keys at one point in time. The result has one slot per key.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    async fn set_many(&self, entries: &[Entry]) -> Result<(), StoreError>;

    /// Writes `entries` only if `guard_key` currently holds one of `allowed`.
    async fn set_many_if(
        &self,
        guard_key: &str,
        allowed: &[&str],
        entries: &[Entry],
    ) -> Result<Guarded, StoreError>;
}
