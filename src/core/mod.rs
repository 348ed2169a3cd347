pub mod error;
pub mod types;

pub use error::{HistoryError, Result};
pub use types::{
    ClosedObjectRecord, ContainerId, MetadataHint, ObjectId, Settings, TrackedObjectRecord,
};
