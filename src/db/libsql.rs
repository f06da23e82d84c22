//! libSQL/Turso backend for the key-value store.
//!
//! Supports two modes:
//! - Local embedded (file-based, no server needed)
//! - In-memory (for testing)

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase};

use crate::db::KeyValueStore;
use crate::error::DatabaseError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// libSQL key-value store.
///
/// Holds one connection for the lifetime of the store; an in-memory
/// database only exists for the connection that created it.
pub struct LibSqlStore {
    _db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local embedded database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {}", e))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {}", e)))?;

        Self::from_database(db).await
    }

    /// Create a new in-memory database (for testing).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {}", e)))?;
        // Concurrent writers wait instead of failing with "database is locked".
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to set busy_timeout: {}", e)))?;

        Ok(Self {
            _db: Arc::new(db),
            conn,
        })
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(format!("libSQL migration failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for LibSqlStore {
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                libsql::params![key, value.to_string(), Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", libsql::params![key])
            .await?;
        match rows.next().await? {
            Some(row) => {
                let text: String = row.get(0)?;
                serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }

    /// Rows whose value is not valid JSON are skipped with a warning.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>, DatabaseError> {
        let prefix_len = prefix.chars().count() as i64;
        let mut rows = self
            .conn
            .query(
                "SELECT key, value FROM kv WHERE substr(key, 1, ?2) = ?1 ORDER BY key",
                libsql::params![prefix, prefix_len],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            let key: String = row.get(0)?;
            let text: String = row.get(1)?;
            match serde_json::from_str(&text) {
                Ok(value) => entries.push((key, value)),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable kv row"),
            }
        }
        Ok(entries)
    }
}
