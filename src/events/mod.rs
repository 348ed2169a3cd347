//! Lifecycle events and the point-in-time query interface of the event source.

pub mod adapter;

pub use adapter::LifecycleAdapter;

use crate::core::{ContainerId, MetadataHint, ObjectId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Notification emitted by the lifecycle event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    Created {
        id: ObjectId,
        #[serde(default)]
        hint: MetadataHint,
    },
    Updated {
        id: ObjectId,
        #[serde(default)]
        hint: MetadataHint,
    },
    Activated {
        id: ObjectId,
    },
    #[serde(rename_all = "camelCase")]
    Destroyed {
        id: ObjectId,
        #[serde(default)]
        was_container_teardown: bool,
    },
    #[serde(rename_all = "camelCase")]
    ContainerDestroyed {
        container_id: ContainerId,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Created { .. } => "created",
            LifecycleEvent::Updated { .. } => "updated",
            LifecycleEvent::Activated { .. } => "activated",
            LifecycleEvent::Destroyed { .. } => "destroyed",
            LifecycleEvent::ContainerDestroyed { .. } => "containerDestroyed",
        }
    }
}

/// Point-in-time queries against the event source.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Every object open right now
    async fn currently_open_objects(&self) -> Result<Vec<(ObjectId, MetadataHint)>>;

    /// Current metadata of one object, `None` once it is gone
    async fn get_object(&self, id: ObjectId) -> Result<Option<MetadataHint>>;
}

/// Event source state held in memory.
///
/// `observe` keeps it in step with a stream of lifecycle events, which is how
/// the replay tool and the tests stand in for a real browser.
#[derive(Default)]
pub struct InMemoryEventSource {
    objects: RwLock<BTreeMap<ObjectId, MetadataHint>>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, id: ObjectId, hint: MetadataHint) {
        self.objects.write().await.insert(id, hint);
    }

    pub async fn close(&self, id: ObjectId) -> Option<MetadataHint> {
        self.objects.write().await.remove(&id)
    }

    /// Apply `event` to the set of open objects
    pub async fn observe(&self, event: &LifecycleEvent) {
        let mut objects = self.objects.write().await;
        match event {
            LifecycleEvent::Created { id, hint } => {
                objects.insert(*id, hint.clone());
            }
            LifecycleEvent::Updated { id, hint } => {
                let entry = objects.entry(*id).or_default();
                if hint.location_ref.is_some() {
                    entry.location_ref = hint.location_ref.clone();
                }
                if hint.label.is_some() {
                    entry.label = hint.label.clone();
                }
                if hint.icon_ref.is_some() {
                    entry.icon_ref = hint.icon_ref.clone();
                }
                if hint.container_id.is_some() {
                    entry.container_id = hint.container_id;
                }
            }
            LifecycleEvent::Activated { .. } => {}
            LifecycleEvent::Destroyed { id, .. } => {
                objects.remove(id);
            }
            LifecycleEvent::ContainerDestroyed { container_id } => {
                objects.retain(|_, hint| hint.container_id != Some(*container_id));
            }
        }
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn currently_open_objects(&self) -> Result<Vec<(ObjectId, MetadataHint)>> {
        let objects = self.objects.read().await;
        Ok(objects.iter().map(|(id, hint)| (*id, hint.clone())).collect())
    }

    async fn get_object(&self, id: ObjectId) -> Result<Option<MetadataHint>> {
        let objects = self.objects.read().await;
        Ok(objects.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event: LifecycleEvent = serde_json::from_str(
            r#"{"event":"destroyed","id":7,"wasContainerTeardown":true}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            LifecycleEvent::Destroyed {
                id: ObjectId(7),
                was_container_teardown: true
            }
        );

        let event: LifecycleEvent = serde_json::from_str(
            r#"{"event":"created","id":1,"hint":{"locationRef":"https://a","containerId":3}}"#,
        )
        .unwrap();
        assert_eq!(event.name(), "created");

        let event: LifecycleEvent =
            serde_json::from_str(r#"{"event":"containerDestroyed","containerId":3}"#).unwrap();
        assert_eq!(
            event,
            LifecycleEvent::ContainerDestroyed {
                container_id: ContainerId(3)
            }
        );
    }

    #[tokio::test]
    async fn test_in_memory_source_tracks_events() {
        let source = InMemoryEventSource::new();
        source
            .observe(&LifecycleEvent::Created {
                id: ObjectId(1),
                hint: MetadataHint::new("https://a", "A").container(ContainerId(1)),
            })
            .await;
        source
            .observe(&LifecycleEvent::Updated {
                id: ObjectId(1),
                hint: MetadataHint::default().label("A2"),
            })
            .await;
        let hint = source.get_object(ObjectId(1)).await.unwrap().unwrap();
        assert_eq!(hint.label.as_deref(), Some("A2"));
        assert_eq!(hint.location_ref.as_deref(), Some("https://a"));

        source
            .observe(&LifecycleEvent::ContainerDestroyed {
                container_id: ContainerId(1),
            })
            .await;
        assert!(source.currently_open_objects().await.unwrap().is_empty());
    }
}
