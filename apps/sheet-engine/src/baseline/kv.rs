//! Key-value persistence seam for the baseline store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key '{key}' already exists")]
    AlreadyExists { key: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored value at '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },

    #[error("design id '{0}' cannot be used as a storage key")]
    InvalidDesignId(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Writes `value` only if `key` is absent. Returns `false` when it already existed.
    async fn put_if_absent(&self, key: &str, value: Bytes) -> Result<bool, StoreError>;

    /// All keys starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_if_absent(&self, key: &str, value: Bytes) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_if_absent_never_overwrites() {
        let kv = MemoryKvStore::new();
        assert!(kv.put_if_absent("a", Bytes::from_static(b"1")).await.unwrap());
        assert!(!kv.put_if_absent("a", Bytes::from_static(b"2")).await.unwrap());
        assert_eq!(kv.get("a").await.unwrap().unwrap(), Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn test_list_keys_filters_by_prefix() {
        let kv = MemoryKvStore::new();
        for key in ["b/2", "a/1", "b/1", "c"] {
            kv.put_if_absent(key, Bytes::new()).await.unwrap();
        }
        assert_eq!(kv.list_keys("b/").await.unwrap(), vec!["b/1", "b/2"]);
        assert!(kv.list_keys("z").await.unwrap().is_empty());
    }
}
