//! In-memory object store for tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use super::{ObjectStore, Result, StorageError};

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
    failing_keys: RwLock<HashSet<String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Every operation touching this key, as source or copy destination,
    /// fails with a request error
    pub async fn fail_key(&self, key: &str) {
        self.failing_keys.write().await.insert(key.to_string());
    }

    async fn check(&self, operation: &'static str, bucket: &str, key: &str) -> Result<()> {
        if self.failing_keys.read().await.contains(key) {
            return Err(StorageError::Request {
                operation,
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.check("download", bucket, key).await?;
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        self.check("check", bucket, key).await?;
        Ok(self.contains(bucket, key).await)
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        self.check("copy", bucket, source_key).await?;
        self.check("copy", bucket, dest_key).await?;
        let data = self.download(bucket, source_key).await?;
        self.put(bucket, dest_key, data).await;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.check("delete", bucket, key).await?;
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_then_delete_moves_object() {
        let store = InMemoryObjectStore::new();
        store.put("lab", "pending/S1.txt", "data").await;

        store
            .copy_then_delete("lab", "pending/S1.txt", "completed/S1.txt")
            .await
            .unwrap();

        assert!(!store.contains("lab", "pending/S1.txt").await);
        assert_eq!(store.download("lab", "completed/S1.txt").await.unwrap(), b"data");
        assert_eq!(store.list("lab", "completed/").await.unwrap(), vec!["completed/S1.txt"]);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.download("lab", "pending/none.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert!(!store.exists("lab", "pending/none.txt").await.unwrap());
    }
}
