//! Standing (capability, origin) grants.
//!
//! Records live under `permission/<capability>/<origin>` in the key-value
//! store. The table is loaded once at startup and kept in memory; a grant
//! is written through to the backend before it becomes visible to `has`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

use crate::capability::Capability;
use crate::db::KeyValueStore;
use crate::error::DatabaseError;
use crate::origin::Origin;

pub const PERMISSION_PREFIX: &str = "permission/";

type PermissionKey = (Capability, Origin);

/// Persisted grant record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub capability: Capability,
    pub origin: Origin,
    pub granted: bool,
    pub created_at: DateTime<Utc>,
}

pub fn storage_key(capability: Capability, origin: &Origin) -> String {
    format!("{PERMISSION_PREFIX}{}/{}", capability.as_str(), origin.as_str())
}

pub struct PermissionStore {
    backend: Arc<dyn KeyValueStore>,
    records: RwLock<HashMap<PermissionKey, PermissionRecord>>,
    key_locks: Mutex<HashMap<PermissionKey, Arc<AsyncMutex<()>>>>,
}

impl PermissionStore {
    /// Load every persisted grant from `backend`. Unreadable records are
    /// skipped with a warning rather than failing startup.
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self, DatabaseError> {
        let mut records = HashMap::new();
        for (key, value) in backend.list(PERMISSION_PREFIX).await? {
            match serde_json::from_value::<PermissionRecord>(value) {
                Ok(record) => {
                    records.insert((record.capability, record.origin.clone()), record);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable permission record"),
            }
        }
        tracing::debug!(count = records.len(), "Loaded permission table");

        Ok(Self {
            backend,
            records: RwLock::new(records),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Whether a standing grant exists. Never prompts, never writes.
    pub async fn has(&self, capability: Capability, origin: &Origin) -> bool {
        self.records
            .read()
            .await
            .get(&(capability, origin.clone()))
            .is_some_and(|record| record.granted)
    }

    /// Persist a standing grant. Idempotent: granting twice keeps the first
    /// record and writes nothing.
    pub async fn grant(&self, capability: Capability, origin: &Origin) -> Result<(), DatabaseError> {
        if self.has(capability, origin).await {
            return Ok(());
        }

        let record = PermissionRecord {
            capability,
            origin: origin.clone(),
            granted: true,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&record)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.backend
            .put(&storage_key(capability, origin), &value)
            .await?;

        tracing::info!(capability = %capability, origin = %origin, "Permission granted");
        self.records
            .write()
            .await
            .insert((capability, origin.clone()), record);
        Ok(())
    }

    /// All records, ordered by capability then origin.
    pub async fn list(&self) -> Vec<PermissionRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| (a.capability, &a.origin).cmp(&(b.capability, &b.origin)));
        records
    }

    /// Serialize authorization transactions on one (capability, origin) key.
    ///
    /// Hold the guard from the permission check until any grant is written
    /// so a concurrent request on the same key observes the decision.
    ///
    /// A request waiting here has not opened a prompt yet, so it does not
    /// appear in `PromptHub::pending()` until the request ahead of it on the
    /// same key resolves.
    pub async fn lock_key(&self, capability: Capability, origin: &Origin) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry((capability, origin.clone()))
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}
