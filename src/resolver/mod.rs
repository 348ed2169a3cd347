//! Recovers metadata for a destroyed object through an ordered fallback chain.

pub mod tiers;

pub use tiers::{DurableSnapshotTier, LiveRegistryTier, LiveRequeryTier, ResolutionTier};

use crate::config::EngineConfig;
use crate::core::{ClosedObjectRecord, ObjectId, TrackedObjectRecord};
use crate::events::EventSource;
use crate::registry::Registry;
use crate::snapshot::SnapshotManager;
use chrono::Utc;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// No tier produced a record with a location
    NoMetadata,
    /// The location is a placeholder or an internal page
    UnrecordableLocation,
}

/// Outcome of resolving one destruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The object went down with its container; nothing is recorded
    Suppressed,
    Discarded(DiscardReason),
    Resolved {
        record: ClosedObjectRecord,
        tier: &'static str,
    },
}

pub struct ClosureResolver {
    tiers: Vec<Box<dyn ResolutionTier>>,
    registry: Registry,
    config: Arc<EngineConfig>,
}

impl ClosureResolver {
    pub fn new(
        tiers: Vec<Box<dyn ResolutionTier>>,
        registry: Registry,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            tiers,
            registry,
            config,
        }
    }

    /// The standard chain: live registry, durable snapshot, live requery
    pub fn standard(
        registry: Registry,
        snapshots: Arc<SnapshotManager>,
        source: Arc<dyn EventSource>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let tiers: Vec<Box<dyn ResolutionTier>> = vec![
            Box::new(LiveRegistryTier::new(registry.clone())),
            Box::new(DurableSnapshotTier::new(snapshots)),
            Box::new(LiveRequeryTier::new(source)),
        ];
        Self::new(tiers, registry, config)
    }

    /// Settle a destruction from the live registry alone, without awaiting.
    ///
    /// Returns `None` when the registry has no usable record and the
    /// remaining tiers have to be consulted with [`ClosureResolver::resolve`].
    /// Calling this when the event arrives pins the registry read to event
    /// order, ahead of any later purge of the same entry.
    pub fn resolve_live(&self, id: ObjectId, was_container_teardown: bool) -> Option<Resolution> {
        let span = info_span!("closure.resolve_live", object = %id, was_container_teardown);
        let _enter = span.enter();

        if was_container_teardown {
            event!(Level::DEBUG, "closure suppressed by container teardown");
            return Some(Resolution::Suppressed);
        }
        match self.registry.get(id) {
            Ok(Some(record)) if !record.location_ref.is_empty() => {
                Some(self.finish(id, record, "registry"))
            }
            Ok(_) => None,
            Err(err) => {
                event!(Level::DEBUG, error = %err, "registry lookup failed");
                None
            }
        }
    }

    /// Run the whole fallback chain
    pub async fn resolve(&self, id: ObjectId, was_container_teardown: bool) -> Resolution {
        let span = info_span!("closure.resolve", object = %id, was_container_teardown);
        self.resolve_in_span(id, was_container_teardown)
            .instrument(span)
            .await
    }

    async fn resolve_in_span(&self, id: ObjectId, was_container_teardown: bool) -> Resolution {
        if was_container_teardown {
            event!(Level::DEBUG, "closure suppressed by container teardown");
            return Resolution::Suppressed;
        }

        let mut found = None;
        for tier in &self.tiers {
            if let Some(record) = tier.lookup(id).await {
                if !record.location_ref.is_empty() {
                    found = Some((record, tier.name()));
                    break;
                }
            }
        }

        match found {
            Some((record, tier)) => self.finish(id, record, tier),
            None => {
                event!(Level::DEBUG, "no tier yielded metadata");
                Resolution::Discarded(DiscardReason::NoMetadata)
            }
        }
    }

    fn finish(&self, id: ObjectId, record: TrackedObjectRecord, tier: &'static str) -> Resolution {
        if !self.config.is_recordable_location(&record.location_ref) {
            event!(Level::DEBUG, location = %record.location_ref, "location not recordable");
            return Resolution::Discarded(DiscardReason::UnrecordableLocation);
        }

        let closed = ClosedObjectRecord::capture(&record, Utc::now());
        if let Err(err) = self.registry.remove(id) {
            event!(Level::WARN, error = %err, "failed to drop resolved entry from registry");
        }
        event!(Level::DEBUG, tier, label = %closed.label, "closure resolved");
        Resolution::Resolved { record: closed, tier }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MetadataHint;
    use crate::events::InMemoryEventSource;
    use crate::storage::MemoryStore;

    struct Fixture {
        registry: Registry,
        snapshots: Arc<SnapshotManager>,
        source: Arc<InMemoryEventSource>,
        resolver: ClosureResolver,
    }

    fn fixture() -> Fixture {
        let registry = Registry::new(64);
        let store = Arc::new(MemoryStore::new());
        let snapshots = Arc::new(SnapshotManager::new(registry.clone(), store));
        let source = Arc::new(InMemoryEventSource::new());
        let resolver = ClosureResolver::standard(
            registry.clone(),
            snapshots.clone(),
            source.clone(),
            Arc::new(EngineConfig::default()),
        );
        Fixture {
            registry,
            snapshots,
            source,
            resolver,
        }
    }

    #[tokio::test]
    async fn test_resolves_from_registry_and_removes_entry() {
        let f = fixture();
        f.registry
            .upsert(ObjectId(7), &MetadataHint::new("https://a.example", "A"))
            .unwrap();

        match f.resolver.resolve(ObjectId(7), false).await {
            Resolution::Resolved { record, tier } => {
                assert_eq!(tier, "registry");
                assert_eq!(record.location_ref, "https://a.example");
                assert_eq!(record.label, "A");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
        assert!(f.registry.get(ObjectId(7)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_snapshot() {
        let f = fixture();
        f.registry
            .upsert(ObjectId(3), &MetadataHint::new("https://snap.example", "Snap"))
            .unwrap();
        f.snapshots.save().await.unwrap();
        f.registry.remove(ObjectId(3)).unwrap();

        match f.resolver.resolve(ObjectId(3), false).await {
            Resolution::Resolved { record, tier } => {
                assert_eq!(tier, "snapshot");
                assert_eq!(record.location_ref, "https://snap.example");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_registry_entry_without_location_falls_through() {
        let f = fixture();
        f.registry
            .upsert(ObjectId(4), &MetadataHint::default().label("Loading"))
            .unwrap();
        f.source
            .open(ObjectId(4), MetadataHint::new("https://late.example", "Late"))
            .await;

        match f.resolver.resolve(ObjectId(4), false).await {
            Resolution::Resolved { record, tier } => {
                assert_eq!(tier, "requery");
                assert_eq!(record.label, "Late");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discards_when_every_tier_misses() {
        let f = fixture();
        assert_eq!(
            f.resolver.resolve(ObjectId(9), false).await,
            Resolution::Discarded(DiscardReason::NoMetadata)
        );
    }

    #[tokio::test]
    async fn test_discards_internal_pages() {
        let f = fixture();
        f.registry
            .upsert(ObjectId(1), &MetadataHint::new("chrome://settings", "Settings"))
            .unwrap();
        f.registry
            .upsert(ObjectId(2), &MetadataHint::new("about:blank", ""))
            .unwrap();
        for id in [1, 2] {
            assert_eq!(
                f.resolver.resolve(ObjectId(id), false).await,
                Resolution::Discarded(DiscardReason::UnrecordableLocation)
            );
        }
    }

    #[tokio::test]
    async fn test_container_teardown_is_suppressed() {
        let f = fixture();
        f.registry
            .upsert(ObjectId(5), &MetadataHint::new("https://e.example", "E"))
            .unwrap();
        assert_eq!(f.resolver.resolve(ObjectId(5), true).await, Resolution::Suppressed);
        assert!(f.registry.get(ObjectId(5)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resolve_live_reads_registry_without_fallback() {
        let f = fixture();
        f.registry
            .upsert(ObjectId(8), &MetadataHint::new("https://h.example", "H"))
            .unwrap();

        match f.resolver.resolve_live(ObjectId(8), false) {
            Some(Resolution::Resolved { record, tier }) => {
                assert_eq!(tier, "registry");
                assert_eq!(record.label, "H");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
        assert!(f.registry.get(ObjectId(8)).unwrap().is_none());

        assert_eq!(f.resolver.resolve_live(ObjectId(8), false), None);
        assert_eq!(
            f.resolver.resolve_live(ObjectId(8), true),
            Some(Resolution::Suppressed)
        );
    }
}
