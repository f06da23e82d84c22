//! In-memory key-value store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::KeyValueStore;
use crate::error::DatabaseError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>, DatabaseError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put("permission/a", &json!(1)).await.unwrap();
        store.put("permission/b", &json!(2)).await.unwrap();
        store.put("other/c", &json!(3)).await.unwrap();

        let listed = store.list("permission/").await.unwrap();
        assert_eq!(
            listed,
            vec![
                ("permission/a".to_string(), json!(1)),
                ("permission/b".to_string(), json!(2)),
            ]
        );
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = MemoryStore::new();
        store.put("k", &json!("old")).await.unwrap();
        store.put("k", &json!("new")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("new")));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}
