use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use super::kv::{KvStore, StoreError};

/// One file per key under `root`; `/` in keys maps to subdirectories.
#[derive(Debug, Clone)]
pub struct FsKvStore {
    root: PathBuf,
}

impl FsKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(StoreError::Backend(format!("invalid key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_if_absent(&self, key: &str, value: Bytes) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&value).await?;
        file.sync_all().await?;
        Ok(true)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if let Some(key) = key_of(&self.root, &path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn key_of(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel.iter().map(|p| p.to_str()).collect::<Option<_>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_is_create_only() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKvStore::new(dir.path());
        assert!(kv.put_if_absent("baselines/d1/v00000001", Bytes::from_static(b"one")).await.unwrap());
        assert!(!kv.put_if_absent("baselines/d1/v00000001", Bytes::from_static(b"two")).await.unwrap());
        assert_eq!(
            kv.get("baselines/d1/v00000001").await.unwrap().unwrap(),
            Bytes::from_static(b"one")
        );
        assert!(kv.get("baselines/d1/v00000002").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_list_keys_walks_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKvStore::new(dir.path());
        for key in ["baselines/d1/v00000002", "baselines/d1/v00000001", "baselines/d2/v00000001"] {
            kv.put_if_absent(key, Bytes::new()).await.unwrap();
        }
        assert_eq!(
            kv.list_keys("baselines/d1/").await.unwrap(),
            vec!["baselines/d1/v00000001", "baselines/d1/v00000002"]
        );
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKvStore::new(dir.path());
        assert!(kv.get("../etc/passwd").await.is_err());
    }
}
