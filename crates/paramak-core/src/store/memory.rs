use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CreateOutcome, WalletStore};
use crate::error::StoreError;

/// In-process store; the write lock makes `create_if_absent` atomic
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored paths starting with `prefix`
    pub async fn count_prefix(&self, prefix: &str) -> usize {
        self.entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(path).cloned())
    }

    async fn create_if_absent(&self, path: &str, value: Value) -> Result<CreateOutcome, StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(path) {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }
        entries.insert(path.to_string(), value);
        Ok(CreateOutcome::Created)
    }

    async fn replace_if_equal(
        &self,
        path: &str,
        expected: &Value,
        value: Value,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(path) != Some(expected) {
            return Ok(false);
        }
        entries.insert(path.to_string(), value);
        Ok(true)
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(path.to_string(), value);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_if_absent_keeps_first_value() {
        let store = MemoryStore::new();
        assert_eq!(
            store.create_if_absent("patients/P1", json!({"a": 1})).await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            store.create_if_absent("patients/P1", json!({"a": 2})).await.unwrap(),
            CreateOutcome::Existing(json!({"a": 1}))
        );
        assert_eq!(store.get("patients/P1").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_concurrent_creates_have_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let tasks = (0..32).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.create_if_absent("k", json!(i)).await.unwrap() })
        });
        let outcomes = futures::future::join_all(tasks).await;
        let created = outcomes
            .into_iter()
            .filter(|o| matches!(o.as_ref().unwrap(), CreateOutcome::Created))
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_replace_if_equal_only_swaps_expected_value() {
        let store = MemoryStore::new();
        assert!(!store
            .replace_if_equal("mints/P1/k", &json!(1), json!(2))
            .await
            .unwrap());
        assert_eq!(store.get("mints/P1/k").await.unwrap(), None);

        store.set("mints/P1/k", json!(1)).await.unwrap();
        assert!(store
            .replace_if_equal("mints/P1/k", &json!(1), json!(2))
            .await
            .unwrap());
        // A second swap from the stale value loses
        assert!(!store
            .replace_if_equal("mints/P1/k", &json!(1), json!(3))
            .await
            .unwrap());
        assert_eq!(store.get("mints/P1/k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let store = MemoryStore::new();
        store.set("vault/a", json!(1)).await.unwrap();
        store.set("vault/b", json!(2)).await.unwrap();
        store.set("patients/a", json!(3)).await.unwrap();
        assert_eq!(store.count_prefix("vault/").await, 2);

        store.delete("vault/a").await.unwrap();
        store.delete("vault/missing").await.unwrap();
        assert_eq!(store.count_prefix("vault/").await, 1);
    }
}
