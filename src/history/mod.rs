//! Bounded, most-recent-first history of closures.
//!
//! All writes to the `history` key go through [`HistoryWriter`], a single
//! sequential worker; readers may load the log directly at any time.

pub mod bounds;
pub mod writer;

pub use bounds::{BoundsController, CapacityBound};
pub use writer::{HistoryOp, HistoryReceipt, HistoryTicket, HistoryWorker, HistoryWriter};

use crate::core::{ClosedObjectRecord, Result, Settings};
use crate::storage::{self, PersistentStore, StoreKey};

/// Load the full history, newest first; a missing key reads as empty
pub async fn read_history(store: &dyn PersistentStore) -> Result<Vec<ClosedObjectRecord>> {
    let history: Option<Vec<ClosedObjectRecord>> = storage::load(store, StoreKey::History).await?;
    Ok(history.unwrap_or_default())
}

pub async fn read_settings(store: &dyn PersistentStore) -> Result<Option<Settings>> {
    storage::load(store, StoreKey::Settings).await
}

/// Drop entries past `capacity` from the tail; returns how many were dropped
pub fn trim_to(history: &mut Vec<ClosedObjectRecord>, capacity: usize) -> usize {
    let before = history.len();
    history.truncate(capacity);
    before - history.len()
}
