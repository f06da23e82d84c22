//! Key-value persistence backing the permission table.
//!
//! Two backends:
//! - **memory**: process-local map, used in tests and ephemeral setups
//! - **libSQL**: embedded SQLite-compatible file via Turso's libSQL fork

#[cfg(feature = "libsql")]
pub mod libsql;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::error::DatabaseError;

pub use memory::MemoryStore;

/// Persistent store of JSON values keyed by string.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or replace the value at `key`.
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError>;

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// All entries whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>, DatabaseError>;
}

/// Open the backend selected by configuration, running migrations as needed.
pub async fn connect_from_config(
    config: &DatabaseConfig,
) -> Result<Arc<dyn KeyValueStore>, DatabaseError> {
    match config.backend {
        DatabaseBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "libsql")]
        DatabaseBackend::LibSql => {
            let store = libsql::LibSqlStore::new_local(&config.libsql_path).await?;
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "libsql"))]
        DatabaseBackend::LibSql => Err(DatabaseError::Pool(
            "libsql backend requested but the `libsql` feature is disabled".to_string(),
        )),
    }
}
