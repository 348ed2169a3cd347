use crate::core::{HistoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
pub const HISTORY_CAPACITY_CEILING: usize = 1000;
pub const DEFAULT_DISPLAY_PAGE_SIZE: usize = 20;
pub const DEFAULT_REGISTRY_CEILING: usize = 4000;
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 30_000;

/// Engine configuration
///
/// Everything here is fixed for the life of the process. The history capacity
/// itself is a runtime setting (see [`crate::history::BoundsController`]); this
/// only carries its default and its absolute ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity used when no settings have been persisted yet
    pub default_history_capacity: usize,

    /// Capacity requests above this are clamped
    pub history_capacity_ceiling: usize,

    /// Page size used when no settings have been persisted yet
    pub default_display_page_size: usize,

    /// Maximum number of live registry entries before the oldest is evicted
    pub registry_ceiling: usize,

    /// Interval of the background registry snapshot
    pub snapshot_interval_ms: u64,

    /// Locations that never produce a history entry
    pub placeholder_locations: Vec<String>,

    /// Location prefixes (schemes) that never produce a history entry
    pub disallowed_location_prefixes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_capacity_ceiling: HISTORY_CAPACITY_CEILING,
            default_display_page_size: DEFAULT_DISPLAY_PAGE_SIZE,
            registry_ceiling: DEFAULT_REGISTRY_CEILING,
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
            placeholder_locations: vec!["about:blank".to_string()],
            disallowed_location_prefixes: vec!["chrome://".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HistoryError::InvalidConfig(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| HistoryError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the default history capacity
    pub fn default_history_capacity(mut self, capacity: usize) -> Self {
        self.default_history_capacity = capacity;
        self
    }

    /// Set the absolute capacity ceiling
    pub fn history_capacity_ceiling(mut self, ceiling: usize) -> Self {
        self.history_capacity_ceiling = ceiling;
        self
    }

    /// Set the default display page size
    pub fn default_display_page_size(mut self, page_size: usize) -> Self {
        self.default_display_page_size = page_size;
        self
    }

    /// Set the live registry ceiling
    pub fn registry_ceiling(mut self, ceiling: usize) -> Self {
        self.registry_ceiling = ceiling;
        self
    }

    /// Set the snapshot interval
    pub fn snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn placeholder_location(mut self, location: &str) -> Self {
        self.placeholder_locations.push(location.to_string());
        self
    }

    pub fn disallowed_prefix(mut self, prefix: &str) -> Self {
        self.disallowed_location_prefixes.push(prefix.to_string());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry_ceiling == 0 {
            return Err(HistoryError::InvalidConfig(
                "registry_ceiling must be positive".to_string(),
            ));
        }
        if self.history_capacity_ceiling == 0 {
            return Err(HistoryError::InvalidConfig(
                "history_capacity_ceiling must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn snapshot_interval_duration(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.max(10))
    }

    /// Whether `location` may be recorded in history at all
    pub fn is_recordable_location(&self, location: &str) -> bool {
        !location.is_empty()
            && !self.placeholder_locations.iter().any(|p| p == location)
            && !self
                .disallowed_location_prefixes
                .iter()
                .any(|prefix| location.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recordable_locations() {
        let config = EngineConfig::default();
        assert!(config.is_recordable_location("https://a.example"));
        assert!(!config.is_recordable_location(""));
        assert!(!config.is_recordable_location("about:blank"));
        assert!(!config.is_recordable_location("chrome://settings"));

        let config = config.disallowed_prefix("edge://");
        assert!(!config.is_recordable_location("edge://flags"));
    }

    #[test]
    fn test_from_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"registry_ceiling": 16}"#).unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.registry_ceiling, 16);
        assert_eq!(config.default_history_capacity, DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let config = EngineConfig::new().registry_ceiling(0);
        assert!(matches!(config.validate(), Err(HistoryError::InvalidConfig(_))));
    }
}
