//! Durable copy of the live registry, used to survive process restarts.

pub mod worker;

pub use worker::{SnapshotWorker, spawn_snapshot_worker};

use crate::core::{ObjectId, Result, TrackedObjectRecord};
use crate::registry::Registry;
use crate::storage::{self, PersistentStore, StoreKey};
use std::sync::Arc;
use tracing::{Level, event};

pub struct SnapshotManager {
    registry: Registry,
    store: Arc<dyn PersistentStore>,
}

impl SnapshotManager {
    pub fn new(registry: Registry, store: Arc<dyn PersistentStore>) -> Self {
        Self { registry, store }
    }

    /// Overwrite the stored snapshot with the registry's current contents
    pub async fn save(&self) -> Result<usize> {
        let records = self.registry.records()?;
        storage::save(self.store.as_ref(), StoreKey::RegistrySnapshot, &records).await?;
        event!(Level::DEBUG, records = records.len(), "registry snapshot written");
        Ok(records.len())
    }

    /// Read the most recently persisted snapshot straight from the store
    pub async fn load_records(&self) -> Result<Vec<TrackedObjectRecord>> {
        let records: Option<Vec<TrackedObjectRecord>> =
            storage::load(self.store.as_ref(), StoreKey::RegistrySnapshot).await?;
        Ok(records.unwrap_or_default())
    }

    pub async fn find(&self, id: ObjectId) -> Result<Option<TrackedObjectRecord>> {
        let records = self.load_records().await?;
        Ok(records.into_iter().find(|record| record.id == id))
    }

    /// Merge the stored snapshot into the registry.
    ///
    /// Live entries keep the values they already have, so a restore that
    /// loses a race with live events never rolls them back.
    pub async fn restore(&self) -> Result<usize> {
        let records = self.load_records().await?;
        for record in &records {
            self.registry.backfill(record)?;
        }
        event!(Level::INFO, records = records.len(), "registry restored from snapshot");
        Ok(records.len())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MetadataHint;
    use crate::storage::MemoryStore;

    fn manager(store: Arc<MemoryStore>) -> SnapshotManager {
        SnapshotManager::new(Registry::new(64), store)
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let snapshots = manager(store.clone());
        let registry = snapshots.registry().clone();

        registry.upsert(ObjectId(1), &MetadataHint::new("https://1", "1")).unwrap();
        registry.upsert(ObjectId(2), &MetadataHint::new("https://2", "2")).unwrap();
        assert_eq!(snapshots.save().await.unwrap(), 2);

        registry.remove(ObjectId(1)).unwrap();
        snapshots.save().await.unwrap();

        let stored = snapshots.load_records().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, ObjectId(2));
        assert!(snapshots.find(ObjectId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_into_fresh_registry() {
        let store = Arc::new(MemoryStore::new());
        let before = manager(store.clone());
        before
            .registry()
            .upsert(ObjectId(7), &MetadataHint::new("https://a.example", "A"))
            .unwrap();
        before.save().await.unwrap();

        let after = manager(store);
        assert_eq!(after.restore().await.unwrap(), 1);
        let record = after.registry().get(ObjectId(7)).unwrap().unwrap();
        assert_eq!(record.location_ref, "https://a.example");
    }

    #[tokio::test]
    async fn test_restore_does_not_override_live_data() {
        let store = Arc::new(MemoryStore::new());
        let old = manager(store.clone());
        old.registry()
            .upsert(ObjectId(1), &MetadataHint::new("https://old", "Old"))
            .unwrap();
        old.save().await.unwrap();

        let fresh = manager(store);
        fresh
            .registry()
            .upsert(ObjectId(1), &MetadataHint::new("https://new", "New"))
            .unwrap();
        fresh.restore().await.unwrap();
        let record = fresh.registry().get(ObjectId(1)).unwrap().unwrap();
        assert_eq!(record.location_ref, "https://new");
        assert_eq!(record.label, "New");
    }

    #[tokio::test]
    async fn test_restore_twice_matches_restore_once() {
        let store = Arc::new(MemoryStore::new());
        let source = manager(store.clone());
        for id in 1..=3 {
            source
                .registry()
                .upsert(ObjectId(id), &MetadataHint::new(&format!("https://{id}"), ""))
                .unwrap();
        }
        source.save().await.unwrap();

        let once = manager(store.clone());
        once.restore().await.unwrap();
        let twice = manager(store);
        twice.restore().await.unwrap();
        twice.restore().await.unwrap();

        assert_eq!(
            once.registry().records().unwrap(),
            twice.registry().records().unwrap()
        );
    }
}
