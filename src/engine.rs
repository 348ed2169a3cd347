//! Wires the registry, snapshot worker, resolver and history pipeline together.

use crate::commands::UiCommand;
use crate::config::EngineConfig;
use crate::core::{ClosedObjectRecord, ObjectId, Result, Settings};
use crate::events::{EventSource, LifecycleAdapter, LifecycleEvent};
use crate::history::{
    BoundsController, CapacityBound, HistoryOp, HistoryReceipt, HistoryWorker, HistoryWriter,
    read_history,
};
use crate::registry::Registry;
use crate::resolver::{ClosureResolver, Resolution};
use crate::snapshot::{SnapshotManager, SnapshotWorker, spawn_snapshot_worker};
use crate::storage::PersistentStore;
use crate::view::{HistoryPage, HistoryQuery, query_history};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{Level, event};

/// What handling one lifecycle event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The registry was updated (or the event was a no-op for it)
    Tracked,
    /// A destruction was resolved; resolved records are queued for history
    Closure(Resolution),
}

pub struct ClosureEngine {
    config: Arc<EngineConfig>,
    store: Arc<dyn PersistentStore>,
    registry: Registry,
    adapter: LifecycleAdapter,
    snapshots: Arc<SnapshotManager>,
    resolver: ClosureResolver,
    writer: HistoryWriter,
    bounds: BoundsController,
    snapshot_worker: Mutex<Option<SnapshotWorker>>,
    history_worker: Mutex<Option<HistoryWorker>>,
}

impl ClosureEngine {
    /// Bring the engine up.
    ///
    /// Storage defaults and the startup trim are queued first, then the
    /// registry is restored from the last snapshot and topped up with the
    /// objects open right now, and finally the snapshot worker starts. Only
    /// an invalid configuration fails; everything else is logged.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn PersistentStore>,
        source: Arc<dyn EventSource>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let bound = CapacityBound::new(
            config.default_history_capacity,
            config.history_capacity_ceiling,
        );
        let (writer, history_worker) = HistoryWriter::spawn(store.clone(), bound.clone());
        let defaults = Settings {
            history_capacity: bound.get(),
            display_page_size: config.default_display_page_size.max(1),
        };
        match writer.submit(HistoryOp::Initialize { defaults })?.wait().await {
            Ok(receipt) => {
                event!(
                    Level::INFO,
                    capacity = receipt.capacity,
                    entries = receipt.length,
                    "history ready"
                );
            }
            Err(err) => event!(Level::ERROR, error = %err, "history initialization failed"),
        }

        let registry = Registry::new(config.registry_ceiling);
        let snapshots = Arc::new(SnapshotManager::new(registry.clone(), store.clone()));
        if let Err(err) = snapshots.restore().await {
            event!(Level::WARN, error = %err, "registry snapshot restore failed");
        }

        let adapter = LifecycleAdapter::new(registry.clone(), source.clone());
        if let Err(err) = adapter.seed_from_source().await {
            event!(Level::WARN, error = %err, "failed to load open objects");
        }

        let resolver =
            ClosureResolver::standard(registry.clone(), snapshots.clone(), source, config.clone());
        let bounds = BoundsController::new(bound, writer.clone());
        let snapshot_worker =
            spawn_snapshot_worker(snapshots.clone(), config.snapshot_interval_duration());

        Ok(Self {
            config,
            store,
            registry,
            adapter,
            snapshots,
            resolver,
            writer,
            bounds,
            snapshot_worker: Mutex::new(Some(snapshot_worker)),
            history_worker: Mutex::new(Some(history_worker)),
        })
    }

    /// Handle one lifecycle event. Failures are logged, never returned.
    pub async fn handle_event(&self, lifecycle_event: &LifecycleEvent) -> EventOutcome {
        match lifecycle_event {
            LifecycleEvent::Destroyed {
                id,
                was_container_teardown,
            } => {
                let resolution = match self.resolver.resolve_live(*id, *was_container_teardown) {
                    Some(resolution) => resolution,
                    None => self.resolver.resolve(*id, *was_container_teardown).await,
                };
                EventOutcome::Closure(self.record(*id, resolution))
            }
            other => {
                if let Err(err) = self.adapter.apply(other).await {
                    event!(
                        Level::WARN,
                        kind = other.name(),
                        error = %err,
                        "lifecycle event not applied"
                    );
                }
                EventOutcome::Tracked
            }
        }
    }

    /// Queue a resolved closure for history; other outcomes pass through.
    fn record(&self, id: ObjectId, resolution: Resolution) -> Resolution {
        if let Resolution::Resolved { record, .. } = &resolution {
            // Completion and failures are reported by the history worker.
            if let Err(err) = self.writer.append(record.clone()) {
                event!(
                    Level::ERROR,
                    object = %id,
                    error = %err,
                    "closure dropped, history writer closed"
                );
            }
        }
        resolution
    }

    /// Drain a stream of lifecycle events until the sender side closes.
    ///
    /// Registry updates and the registry read of each destruction happen in
    /// arrival order. A destruction the registry cannot settle goes to its own
    /// task for the snapshot and requery tiers, so those may interleave; their
    /// history writes are still serialized by the writer.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<LifecycleEvent>) {
        let mut closures = JoinSet::new();
        while let Some(lifecycle_event) = events.recv().await {
            if let LifecycleEvent::Destroyed {
                id,
                was_container_teardown,
            } = lifecycle_event
            {
                match self.resolver.resolve_live(id, was_container_teardown) {
                    Some(resolution) => {
                        self.record(id, resolution);
                    }
                    None => {
                        let engine = self.clone();
                        closures.spawn(async move {
                            let resolution = engine.resolver.resolve(id, false).await;
                            engine.record(id, resolution)
                        });
                    }
                }
            } else {
                self.handle_event(&lifecycle_event).await;
            }
            while closures.try_join_next().is_some() {}
        }
        while closures.join_next().await.is_some() {}
    }

    /// Handle a UI command; returns the log state once it has been applied.
    pub async fn handle_command(&self, command: &UiCommand) -> Option<HistoryReceipt> {
        let result = match command {
            UiCommand::UpdateHistoryCapacity { value } => self.bounds.set_capacity(*value).await,
            UiCommand::UpdateDisplayPageSize { value } => {
                let page_size = usize::try_from(*value).unwrap_or(1).max(1);
                self.submit_and_wait(HistoryOp::SetDisplayPageSize(page_size)).await
            }
            UiCommand::ClearHistory => self.submit_and_wait(HistoryOp::Clear).await,
        };
        match result {
            Ok(receipt) => Some(receipt),
            Err(err) => {
                event!(Level::ERROR, ?command, error = %err, "ui command failed");
                None
            }
        }
    }

    /// Parse and handle a raw UI message
    pub async fn handle_message(&self, message: &serde_json::Value) -> Option<HistoryReceipt> {
        match UiCommand::parse(message) {
            Ok(command) => self.handle_command(&command).await,
            Err(err) => {
                event!(Level::WARN, error = %err, "ignoring malformed ui message");
                None
            }
        }
    }

    async fn submit_and_wait(&self, op: HistoryOp) -> Result<HistoryReceipt> {
        self.writer.submit(op)?.wait().await
    }

    /// Wait until every history write queued so far has completed
    pub async fn flush(&self) -> Result<HistoryReceipt> {
        self.writer.flush().await
    }

    pub async fn history(&self) -> Result<Vec<ClosedObjectRecord>> {
        read_history(self.store.as_ref()).await
    }

    pub async fn query(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        query_history(self.store.as_ref(), query).await
    }

    /// Take a registry snapshot right now, outside the periodic schedule
    pub async fn snapshot_now(&self) -> Result<usize> {
        self.snapshots.save().await
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn bounds(&self) -> &BoundsController {
        &self.bounds
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop the snapshot worker, write a final snapshot and drain the history
    /// pipeline. Later history writes fail with `WriterClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(worker) = self.snapshot_worker.lock().await.take() {
            worker.stop().await?;
        }
        if let Err(err) = self.snapshots.save().await {
            event!(Level::WARN, error = %err, "final registry snapshot failed");
        }
        if let Some(worker) = self.history_worker.lock().await.take() {
            worker.shutdown().await?;
        }
        event!(Level::INFO, "engine stopped");
        Ok(())
    }
}
