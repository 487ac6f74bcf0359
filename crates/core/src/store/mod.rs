//! # Artifact Store
//!
//! Blob storage addressed by `(bucket, key)`. Two backends: an in-memory map
//! and the SQLite database under the runtime directory.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] if absent
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Keys in a bucket, sorted
    async fn list(&self, bucket: &str) -> Result<Vec<String>, StoreError>;
}

pub(crate) fn validate_location(bucket: &str, key: &str) -> Result<(), StoreError> {
    if bucket.trim().is_empty() {
        return Err(StoreError::InvalidLocation("empty bucket".to_string()));
    }
    if key.trim().is_empty() {
        return Err(StoreError::InvalidLocation(format!(
            "empty key in bucket '{}'",
            bucket
        )));
    }
    Ok(())
}

/// Read an artifact as UTF-8 text
pub async fn read_text(
    store: &dyn ArtifactStore,
    bucket: &str,
    key: &str,
) -> Result<String, StoreError> {
    let bytes = store.get(bucket, key).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read an artifact as text, treating a missing artifact as empty
pub async fn read_text_or_empty(
    store: &dyn ArtifactStore,
    bucket: &str,
    key: &str,
) -> Result<String, StoreError> {
    match read_text(store, bucket, key).await {
        Ok(text) => Ok(text),
        Err(e) if e.is_not_found() => Ok(String::new()),
        Err(e) => Err(e),
    }
}

pub async fn write_text(
    store: &dyn ArtifactStore,
    bucket: &str,
    key: &str,
    text: &str,
) -> Result<(), StoreError> {
    store.put(bucket, key, text.as_bytes().to_vec()).await
}
