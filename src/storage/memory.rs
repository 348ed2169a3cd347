use super::{PersistentStore, StoreKey};
use crate::core::{HistoryError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-process store, used by tests and by embedders without durable storage.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<StoreKey, serde_json::Value>>,
    fail_next_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with a storage error
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: StoreKey) -> Result<Option<serde_json::Value>> {
        let values = self.values.read().await;
        Ok(values.get(&key).cloned())
    }

    async fn set(&self, key: StoreKey, value: serde_json::Value) -> Result<()> {
        let injected = self
            .fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(HistoryError::Storage(format!("injected write failure for '{}'", key)));
        }
        // Yield so concurrent callers can interleave between read and write.
        tokio::task::yield_now().await;
        let mut values = self.values.write().await;
        values.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set() {
        let store = MemoryStore::new();
        assert!(store.get(StoreKey::History).await.unwrap().is_none());
        store.set(StoreKey::History, json!([1, 2])).await.unwrap();
        assert_eq!(store.get(StoreKey::History).await.unwrap(), Some(json!([1, 2])));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        assert!(store.set(StoreKey::Settings, json!({})).await.is_err());
        assert!(store.set(StoreKey::Settings, json!({})).await.is_ok());
        assert_eq!(store.write_count(), 1);
    }
}
