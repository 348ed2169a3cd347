// ============================================================================
// Closed Tab History Library
// ============================================================================

pub mod commands;
pub mod config;
pub mod core;
pub mod engine;
pub mod events;
pub mod history;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod storage;
pub mod view;

// Re-export main types for convenience
pub use commands::UiCommand;
pub use config::EngineConfig;
pub use core::{
    ClosedObjectRecord, ContainerId, HistoryError, MetadataHint, ObjectId, Result, Settings,
    TrackedObjectRecord,
};
pub use engine::{ClosureEngine, EventOutcome};
pub use events::{EventSource, InMemoryEventSource, LifecycleAdapter, LifecycleEvent};
pub use history::{BoundsController, CapacityBound, HistoryOp, HistoryReceipt, HistoryWriter};
pub use registry::{MetadataStore, Registry};
pub use resolver::{ClosureResolver, DiscardReason, Resolution, ResolutionTier};
pub use snapshot::SnapshotManager;
pub use storage::{FileStore, MemoryStore, PersistentStore, StoreCodec, StoreKey};
pub use view::{HistoryPage, HistoryQuery};
