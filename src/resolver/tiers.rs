use crate::core::{ObjectId, TrackedObjectRecord};
use crate::events::EventSource;
use crate::registry::Registry;
use crate::snapshot::SnapshotManager;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Level, event};

/// One step of the closure fallback chain.
///
/// A tier never fails outward: lookup errors are logged and read as a miss.
#[async_trait]
pub trait ResolutionTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lookup(&self, id: ObjectId) -> Option<TrackedObjectRecord>;
}

pub struct LiveRegistryTier {
    registry: Registry,
}

impl LiveRegistryTier {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ResolutionTier for LiveRegistryTier {
    fn name(&self) -> &'static str {
        "registry"
    }

    async fn lookup(&self, id: ObjectId) -> Option<TrackedObjectRecord> {
        match self.registry.get(id) {
            Ok(record) => record,
            Err(err) => {
                event!(Level::DEBUG, object = %id, error = %err, "registry lookup failed");
                None
            }
        }
    }
}

/// Reads the persisted snapshot fresh on every lookup.
pub struct DurableSnapshotTier {
    snapshots: Arc<SnapshotManager>,
}

impl DurableSnapshotTier {
    pub fn new(snapshots: Arc<SnapshotManager>) -> Self {
        Self { snapshots }
    }
}

#[async_trait]
impl ResolutionTier for DurableSnapshotTier {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn lookup(&self, id: ObjectId) -> Option<TrackedObjectRecord> {
        match self.snapshots.find(id).await {
            Ok(record) => record,
            Err(err) => {
                event!(Level::DEBUG, object = %id, error = %err, "snapshot lookup failed");
                None
            }
        }
    }
}

/// Last resort: ask the event source for the object among those still open.
pub struct LiveRequeryTier {
    source: Arc<dyn EventSource>,
}

impl LiveRequeryTier {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ResolutionTier for LiveRequeryTier {
    fn name(&self) -> &'static str {
        "requery"
    }

    async fn lookup(&self, id: ObjectId) -> Option<TrackedObjectRecord> {
        match self.source.currently_open_objects().await {
            Ok(objects) => objects
                .into_iter()
                .find(|(open_id, _)| *open_id == id)
                .map(|(open_id, hint)| TrackedObjectRecord::from_hint(open_id, &hint)),
            Err(err) => {
                event!(Level::DEBUG, object = %id, error = %err, "open object requery failed");
                None
            }
        }
    }
}
