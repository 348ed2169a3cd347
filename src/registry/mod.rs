//! Live registry of currently open objects.

use crate::core::{MetadataHint, ObjectId, Result, TrackedObjectRecord};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// In-memory map from object id to last-known metadata.
///
/// Entries are kept in insertion order: updates go through `peek_mut` and never
/// promote, so the cache's least-recent entry is always the oldest insert and
/// is the one evicted when the ceiling is reached.
pub struct MetadataStore {
    entries: LruCache<ObjectId, TrackedObjectRecord>,
}

impl MetadataStore {
    pub fn new(ceiling: usize) -> Self {
        let ceiling = NonZeroUsize::new(ceiling).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(ceiling),
        }
    }

    /// Merge `hint` into the record for `id`, inserting it if absent.
    ///
    /// Returns the record evicted to make room, if any.
    pub fn upsert(&mut self, id: ObjectId, hint: &MetadataHint) -> Option<TrackedObjectRecord> {
        if let Some(existing) = self.entries.peek_mut(&id) {
            existing.merge_hint(hint);
            return None;
        }
        self.insert_new(TrackedObjectRecord::from_hint(id, hint))
    }

    /// Merge a recovered record, keeping whatever the live entry already knows.
    pub fn backfill(&mut self, record: &TrackedObjectRecord) -> Option<TrackedObjectRecord> {
        if let Some(existing) = self.entries.peek_mut(&record.id) {
            existing.backfill(record);
            return None;
        }
        self.insert_new(record.clone())
    }

    fn insert_new(&mut self, record: TrackedObjectRecord) -> Option<TrackedObjectRecord> {
        self.entries
            .push(record.id, record)
            .map(|(_, evicted)| evicted)
    }

    pub fn get(&self, id: ObjectId) -> Option<&TrackedObjectRecord> {
        self.entries.peek(&id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<TrackedObjectRecord> {
        self.entries.pop(&id)
    }

    /// Remove every record matching `predicate`, returning how many were removed
    pub fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&TrackedObjectRecord) -> bool,
    {
        let doomed: Vec<ObjectId> = self
            .entries
            .iter()
            .filter(|(_, record)| predicate(record))
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.entries.pop(id);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All records, oldest insert first
    pub fn records(&self) -> Vec<TrackedObjectRecord> {
        self.entries.iter().rev().map(|(_, record)| record.clone()).collect()
    }
}

/// Shared handle to the live registry.
///
/// Every operation takes the lock for exactly one store call; nothing awaits
/// while holding it.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<MetadataStore>>,
}

impl Registry {
    pub fn new(ceiling: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetadataStore::new(ceiling))),
        }
    }

    pub fn upsert(&self, id: ObjectId, hint: &MetadataHint) -> Result<Option<TrackedObjectRecord>> {
        let mut store = self.inner.lock()?;
        Ok(store.upsert(id, hint))
    }

    pub fn backfill(&self, record: &TrackedObjectRecord) -> Result<Option<TrackedObjectRecord>> {
        let mut store = self.inner.lock()?;
        Ok(store.backfill(record))
    }

    pub fn get(&self, id: ObjectId) -> Result<Option<TrackedObjectRecord>> {
        let store = self.inner.lock()?;
        Ok(store.get(id).cloned())
    }

    pub fn remove(&self, id: ObjectId) -> Result<Option<TrackedObjectRecord>> {
        let mut store = self.inner.lock()?;
        Ok(store.remove(id))
    }

    pub fn remove_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&TrackedObjectRecord) -> bool,
    {
        let mut store = self.inner.lock()?;
        Ok(store.remove_where(predicate))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.inner.lock()?.is_empty())
    }

    pub fn records(&self) -> Result<Vec<TrackedObjectRecord>> {
        Ok(self.inner.lock()?.records())
    }
}
