use super::SnapshotManager;
use crate::core::{HistoryError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Instrument, Level, event, info_span};

/// Background worker for periodic registry snapshots.
pub struct SnapshotWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl SnapshotWorker {
    /// Signals the worker to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| HistoryError::Storage(format!("snapshot worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the periodic snapshot task.
///
/// A failed tick is logged and the next tick runs as scheduled.
pub fn spawn_snapshot_worker(manager: Arc<SnapshotManager>, interval: Duration) -> SnapshotWorker {
    let interval = interval.max(Duration::from_millis(10));
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    _ = sleep(interval) => {
                        if let Err(err) = manager.save().await {
                            event!(Level::WARN, error = %err, "registry snapshot failed");
                        }
                    }
                }
            }
            event!(Level::DEBUG, "snapshot worker stopped");
        }
        .instrument(info_span!("snapshot.worker", interval_ms = interval.as_millis() as u64)),
    );

    SnapshotWorker {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
