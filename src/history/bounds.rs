use super::writer::{HistoryOp, HistoryReceipt, HistoryWriter};
use crate::core::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Level, event};

/// Process-wide history capacity, shared by the writer and the controller.
#[derive(Debug)]
pub struct CapacityBound {
    current: AtomicUsize,
    ceiling: usize,
}

impl CapacityBound {
    pub fn new(initial: usize, ceiling: usize) -> Arc<Self> {
        let ceiling = ceiling.max(1);
        Arc::new(Self {
            current: AtomicUsize::new(initial.clamp(1, ceiling)),
            ceiling,
        })
    }

    pub fn get(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Clamp `requested` into `1..=ceiling`
    pub fn clamp(&self, requested: i64) -> usize {
        if requested < 1 {
            1
        } else {
            usize::try_from(requested).unwrap_or(usize::MAX).min(self.ceiling)
        }
    }

    /// Store a clamped capacity and return the value actually applied
    pub fn set(&self, requested: i64) -> usize {
        let capacity = self.clamp(requested);
        self.current.store(capacity, Ordering::SeqCst);
        capacity
    }
}

/// Runtime control over the history capacity.
#[derive(Clone)]
pub struct BoundsController {
    bound: Arc<CapacityBound>,
    writer: HistoryWriter,
}

impl BoundsController {
    pub fn new(bound: Arc<CapacityBound>, writer: HistoryWriter) -> Self {
        Self { bound, writer }
    }

    pub fn capacity(&self) -> usize {
        self.bound.get()
    }

    pub fn ceiling(&self) -> usize {
        self.bound.ceiling()
    }

    /// Apply a new capacity to all future writes and trim the persisted log.
    ///
    /// The trim runs on the history pipeline behind any writes already queued.
    /// Out-of-range values are clamped, never rejected.
    pub async fn set_capacity(&self, requested: i64) -> Result<HistoryReceipt> {
        let capacity = self.bound.set(requested);
        if i64::try_from(capacity).ok() != Some(requested) {
            event!(Level::INFO, requested, applied = capacity, "history capacity clamped");
        }
        self.writer.submit(HistoryOp::SetCapacity(capacity))?.wait().await
    }
}
