use super::{EventSource, LifecycleEvent};
use crate::core::{ContainerId, MetadataHint, ObjectId, Result};
use crate::registry::Registry;
use std::sync::Arc;
use tracing::{Level, event};

/// Keeps the live registry in step with lifecycle events.
pub struct LifecycleAdapter {
    registry: Registry,
    source: Arc<dyn EventSource>,
}

impl LifecycleAdapter {
    pub fn new(registry: Registry, source: Arc<dyn EventSource>) -> Self {
        Self { registry, source }
    }

    /// Apply a non-destructive lifecycle event to the registry.
    ///
    /// `destroyed` is not handled here; it belongs to the closure path.
    pub async fn apply(&self, lifecycle_event: &LifecycleEvent) -> Result<()> {
        match lifecycle_event {
            LifecycleEvent::Created { id, hint } | LifecycleEvent::Updated { id, hint } => {
                self.upsert(*id, hint)
            }
            LifecycleEvent::Activated { id } => self.activated(*id).await,
            LifecycleEvent::ContainerDestroyed { container_id } => {
                self.container_destroyed(*container_id)
            }
            LifecycleEvent::Destroyed { .. } => Ok(()),
        }
    }

    fn upsert(&self, id: ObjectId, hint: &MetadataHint) -> Result<()> {
        if let Some(evicted) = self.registry.upsert(id, hint)? {
            event!(
                Level::DEBUG,
                evicted = %evicted.id,
                "registry ceiling reached, evicted oldest entry"
            );
        }
        Ok(())
    }

    /// Activation is best-effort enrichment: a failed or empty query is a no-op.
    async fn activated(&self, id: ObjectId) -> Result<()> {
        match self.source.get_object(id).await {
            Ok(Some(hint)) => self.upsert(id, &hint),
            Ok(None) => {
                event!(Level::DEBUG, object = %id, "activated object already gone");
                Ok(())
            }
            Err(err) => {
                event!(Level::DEBUG, object = %id, error = %err, "activation query failed");
                Ok(())
            }
        }
    }

    fn container_destroyed(&self, container_id: ContainerId) -> Result<()> {
        let removed = self
            .registry
            .remove_where(|record| record.container_id == Some(container_id))?;
        event!(Level::DEBUG, container = %container_id, removed, "container purged from registry");
        Ok(())
    }

    /// Load every currently open object into the registry
    pub async fn seed_from_source(&self) -> Result<usize> {
        let objects = self.source.currently_open_objects().await?;
        for (id, hint) in &objects {
            self.upsert(*id, hint)?;
        }
        event!(Level::INFO, count = objects.len(), "seeded registry from open objects");
        Ok(objects.len())
    }
}
