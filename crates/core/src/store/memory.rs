use super::{validate_location, ArtifactStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Volatile store backed by a map
#[derive(Default)]
pub struct InMemoryStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        validate_location(bucket, key)?;
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;
        blobs.insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        validate_location(bucket, key)?;
        let blobs = self
            .blobs
            .read()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;
        blobs
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;
        let mut keys: Vec<String> = blobs
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{read_text_or_empty, write_text};

    #[tokio::test]
    async fn test_round_trip() {
        let store = InMemoryStore::new();
        store.put("b", "k", b"payload".to_vec()).await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), b"payload".to_vec());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = InMemoryStore::new();
        let err = store.get("b", "missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(read_text_or_empty(&store, "b", "missing").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_overwrite_and_list() {
        let store = InMemoryStore::new();
        write_text(&store, "b", "z", "first").await.unwrap();
        write_text(&store, "b", "z", "second").await.unwrap();
        write_text(&store, "b", "a", "other").await.unwrap();
        write_text(&store, "c", "x", "elsewhere").await.unwrap();

        assert_eq!(store.get("b", "z").await.unwrap(), b"second".to_vec());
        assert_eq!(store.list("b").await.unwrap(), vec!["a", "z"]);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_location_rejected() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.put("", "k", vec![]).await,
            Err(StoreError::InvalidLocation(_))
        ));
        assert!(matches!(
            store.get("b", " ").await,
            Err(StoreError::InvalidLocation(_))
        ));
    }
}
