use crate::config::{DEFAULT_DISPLAY_PAGE_SIZE, DEFAULT_HISTORY_CAPACITY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a tracked object as reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub i64);

/// Identifier of the container (window) holding tracked objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub i64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partial metadata carried by lifecycle events and point-in-time queries.
///
/// Every field may be missing or empty; empty strings are treated the same
/// as missing values when merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataHint {
    pub location_ref: Option<String>,
    pub label: Option<String>,
    pub icon_ref: Option<String>,
    pub container_id: Option<ContainerId>,
}

impl MetadataHint {
    pub fn new(location_ref: &str, label: &str) -> Self {
        Self {
            location_ref: Some(location_ref.to_string()),
            label: Some(label.to_string()),
            ..Self::default()
        }
    }

    pub fn location(mut self, location_ref: &str) -> Self {
        self.location_ref = Some(location_ref.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn icon(mut self, icon_ref: &str) -> Self {
        self.icon_ref = Some(icon_ref.to_string());
        self
    }

    pub fn container(mut self, container_id: ContainerId) -> Self {
        self.container_id = Some(container_id);
        self
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn pick(preferred: &str, fallback: &str) -> String {
    if preferred.is_empty() {
        fallback.to_string()
    } else {
        preferred.to_string()
    }
}

/// Last-known metadata of a currently open object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedObjectRecord {
    pub id: ObjectId,
    #[serde(default)]
    pub location_ref: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon_ref: String,
    #[serde(default)]
    pub container_id: Option<ContainerId>,
}

impl TrackedObjectRecord {
    pub fn from_hint(id: ObjectId, hint: &MetadataHint) -> Self {
        let mut record = Self {
            id,
            location_ref: String::new(),
            label: String::new(),
            icon_ref: String::new(),
            container_id: None,
        };
        record.merge_hint(hint);
        record
    }

    /// Merges incoming event data over this record.
    ///
    /// Per field, the first non-empty value in (incoming, existing) wins, so an
    /// empty incoming value never erases what is already known. The container
    /// follows the latest event that names one.
    pub fn merge_hint(&mut self, hint: &MetadataHint) {
        if let Some(location) = non_empty(&hint.location_ref) {
            self.location_ref = location.to_string();
        }
        if let Some(icon) = non_empty(&hint.icon_ref) {
            self.icon_ref = icon.to_string();
        }
        if let Some(label) = non_empty(&hint.label) {
            self.label = label.to_string();
        }
        if self.label.is_empty() {
            self.label = self.location_ref.clone();
        }
        if hint.container_id.is_some() {
            self.container_id = hint.container_id;
        }
    }

    /// Fills only the fields this record is missing from `older`.
    pub fn backfill(&mut self, older: &TrackedObjectRecord) {
        let label_is_fallback = self.label.is_empty() || self.label == self.location_ref;
        self.location_ref = pick(&self.location_ref, &older.location_ref);
        self.icon_ref = pick(&self.icon_ref, &older.icon_ref);
        if label_is_fallback && !older.label.is_empty() && older.location_ref == self.location_ref {
            self.label = older.label.clone();
        }
        if self.label.is_empty() {
            self.label = self.location_ref.clone();
        }
        if self.container_id.is_none() {
            self.container_id = older.container_id;
        }
    }

    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.location_ref
        } else {
            &self.label
        }
    }
}

/// A resolved closure, as stored in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedObjectRecord {
    pub id: String,
    pub location_ref: String,
    pub label: String,
    #[serde(default)]
    pub icon_ref: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub closed_at: DateTime<Utc>,
    #[serde(default)]
    pub container_id: Option<ContainerId>,
}

impl ClosedObjectRecord {
    /// Captures `record` as a closure event. Every capture gets a fresh v4 id,
    /// so two captures in the same millisecond never collide.
    pub fn capture(record: &TrackedObjectRecord, closed_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            location_ref: record.location_ref.clone(),
            label: record.display_label().to_string(),
            icon_ref: record.icon_ref.clone(),
            closed_at,
            container_id: record.container_id,
        }
    }
}

/// Settings shared with the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(alias = "maxHistory")]
    pub history_capacity: usize,
    #[serde(alias = "displayCount")]
    pub display_page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            display_page_size: DEFAULT_DISPLAY_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_known_label_when_incoming_is_empty() {
        let id = ObjectId(1);
        let mut record = TrackedObjectRecord::from_hint(id, &MetadataHint::default().label("A"));
        record.merge_hint(&MetadataHint::default().label("").location("http://x"));
        assert_eq!(record.label, "A");
        assert_eq!(record.location_ref, "http://x");
    }

    #[test]
    fn test_label_falls_back_to_location() {
        let record = TrackedObjectRecord::from_hint(
            ObjectId(2),
            &MetadataHint::default().location("https://a.example"),
        );
        assert_eq!(record.label, "https://a.example");

        let mut record = record;
        record.merge_hint(&MetadataHint::default().label("Example"));
        assert_eq!(record.label, "Example");
    }

    #[test]
    fn test_backfill_keeps_live_values() {
        let mut live = TrackedObjectRecord::from_hint(
            ObjectId(3),
            &MetadataHint::new("https://live.example", "Live"),
        );
        let older = TrackedObjectRecord::from_hint(
            ObjectId(3),
            &MetadataHint::new("https://old.example", "Old")
                .icon("https://old.example/icon.png")
                .container(ContainerId(4)),
        );
        live.backfill(&older);
        assert_eq!(live.location_ref, "https://live.example");
        assert_eq!(live.label, "Live");
        assert_eq!(live.icon_ref, "https://old.example/icon.png");
        assert_eq!(live.container_id, Some(ContainerId(4)));
    }

    #[test]
    fn test_settings_accept_legacy_field_names() {
        let settings: Settings =
            serde_json::from_str(r#"{"displayCount": 30, "maxHistory": 250}"#).unwrap();
        assert_eq!(settings.history_capacity, 250);
        assert_eq!(settings.display_page_size, 30);

        let json = serde_json::to_value(settings).unwrap();
        assert_eq!(json["historyCapacity"], 250);
        assert_eq!(json["displayPageSize"], 30);
    }

    #[test]
    fn test_capture_ids_are_unique() {
        let record =
            TrackedObjectRecord::from_hint(ObjectId(5), &MetadataHint::new("https://b", ""));
        let now = Utc::now();
        let a = ClosedObjectRecord::capture(&record, now);
        let b = ClosedObjectRecord::capture(&record, now);
        assert_ne!(a.id, b.id);
        assert_eq!(a.label, "https://b");
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["closedAt"], now.timestamp_millis());
    }
}
