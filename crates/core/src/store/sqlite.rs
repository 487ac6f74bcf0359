//! # SQLite Artifact Store
//!
//! Durable store in `.specforge/specforge.db`. One `artifacts` table keyed by
//! `(bucket, key)`, versioned through `schema_version`.

use super::{validate_location, ArtifactStore};
use crate::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at a specific path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path.as_ref()).context("Failed to open specforge database")?;
        Self::with_connection(conn)
    }

    /// Private in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        tracing::debug!(version = SCHEMA_VERSION, "Artifact store schema ready");
        Ok(())
    }

    /// Current schema version
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let version = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))
    }
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            bucket TEXT NOT NULL,
            key TEXT NOT NULL,
            data BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (bucket, key)
        )
        "#,
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_artifacts_bucket ON artifacts(bucket)",
        [],
    )?;
    Ok(())
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        validate_location(bucket, key)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO artifacts (bucket, key, data) VALUES (?1, ?2, ?3)
            ON CONFLICT(bucket, key) DO UPDATE SET
                data = excluded.data,
                updated_at = datetime('now')
            "#,
            params![bucket, key, data],
        )?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        validate_location(bucket, key)?;
        let conn = self.lock()?;
        conn.query_row(
            "SELECT data FROM artifacts WHERE bucket = ?1 AND key = ?2",
            params![bucket, key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM artifacts WHERE bucket = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![bucket], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_applied() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_round_trip_and_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put("requirements-artifacts", "conv/doc.md", b"v1".to_vec())
            .await
            .unwrap();
        store
            .put("requirements-artifacts", "conv/doc.md", b"v2".to_vec())
            .await
            .unwrap();

        assert_eq!(
            store.get("requirements-artifacts", "conv/doc.md").await.unwrap(),
            b"v2".to_vec()
        );
        assert_eq!(
            store.list("requirements-artifacts").await.unwrap(),
            vec!["conv/doc.md"]
        );
    }

    #[test]
    fn test_missing_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = tokio_test::block_on(store.get("b", "nothing")).unwrap_err();
        assert_eq!(err, StoreError::not_found("b", "nothing"));
    }

    #[test]
    fn test_empty_location_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = tokio_test::block_on(store.put("", "k", Vec::new())).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn test_reopen_preserves_data() {
        let dir = std::env::temp_dir().join(format!("specforge-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("specforge.db");
        {
            let store = SqliteStore::open_at(&path).unwrap();
            store.put("b", "k", b"kept".to_vec()).await.unwrap();
        }
        let reopened = SqliteStore::open_at(&path).unwrap();
        assert_eq!(reopened.get("b", "k").await.unwrap(), b"kept".to_vec());
        let _ = std::fs::remove_dir_all(dir);
    }
}
