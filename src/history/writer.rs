use super::bounds::CapacityBound;
use super::{read_history, read_settings, trim_to};
use crate::core::{ClosedObjectRecord, HistoryError, Result, Settings};
use crate::storage::{self, PersistentStore, StoreKey};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

/// A read-modify-write step executed by the history worker.
#[derive(Debug, Clone)]
pub enum HistoryOp {
    /// Create missing keys with defaults, adopt the stored capacity and trim to it
    Initialize { defaults: Settings },
    /// Prepend a closure and trim to the current capacity
    Append(ClosedObjectRecord),
    /// Persist a new capacity and trim to it
    SetCapacity(usize),
    /// Persist a new display page size
    SetDisplayPageSize(usize),
    /// Replace the history with an empty log
    Clear,
    /// Completes once everything queued before it has completed
    Barrier,
    /// Stop the worker after everything queued before it
    Shutdown,
}

impl HistoryOp {
    pub fn name(&self) -> &'static str {
        match self {
            HistoryOp::Initialize { .. } => "initialize",
            HistoryOp::Append(_) => "append",
            HistoryOp::SetCapacity(_) => "set_capacity",
            HistoryOp::SetDisplayPageSize(_) => "set_display_page_size",
            HistoryOp::Clear => "clear",
            HistoryOp::Barrier => "barrier",
            HistoryOp::Shutdown => "shutdown",
        }
    }
}

/// State of the log after an operation completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryReceipt {
    pub length: usize,
    pub capacity: usize,
}

struct HistoryRequest {
    op: HistoryOp,
    ack: oneshot::Sender<Result<HistoryReceipt>>,
}

/// Completion handle for a submitted operation.
///
/// Dropping it does not cancel the operation.
pub struct HistoryTicket {
    rx: oneshot::Receiver<Result<HistoryReceipt>>,
}

impl HistoryTicket {
    pub async fn wait(self) -> Result<HistoryReceipt> {
        self.rx.await.map_err(|_| HistoryError::WriterClosed)?
    }
}

/// Submission side of the history pipeline.
///
/// Requests run strictly one at a time in submission order; a request does not
/// read the log until the previous one has finished writing it.
#[derive(Clone)]
pub struct HistoryWriter {
    tx: mpsc::UnboundedSender<HistoryRequest>,
}

/// The task draining the pipeline
pub struct HistoryWorker {
    writer: HistoryWriter,
    join_handle: Option<JoinHandle<()>>,
}

impl HistoryWriter {
    pub fn spawn(
        store: Arc<dyn PersistentStore>,
        bound: Arc<CapacityBound>,
    ) -> (HistoryWriter, HistoryWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let join_handle = tokio::spawn(
            run_history_worker(store, bound, rx).instrument(info_span!("history.worker")),
        );
        let writer = HistoryWriter { tx };
        let worker = HistoryWorker {
            writer: writer.clone(),
            join_handle: Some(join_handle),
        };
        (writer, worker)
    }

    pub fn submit(&self, op: HistoryOp) -> Result<HistoryTicket> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(HistoryRequest { op, ack })
            .map_err(|_| HistoryError::WriterClosed)?;
        Ok(HistoryTicket { rx })
    }

    /// Queue a resolved closure
    pub fn append(&self, record: ClosedObjectRecord) -> Result<HistoryTicket> {
        self.submit(HistoryOp::Append(record))
    }

    /// Wait until every operation submitted so far has completed
    pub async fn flush(&self) -> Result<HistoryReceipt> {
        self.submit(HistoryOp::Barrier)?.wait().await
    }
}

impl HistoryWorker {
    /// Drain everything already queued, then stop the worker.
    pub async fn shutdown(mut self) -> Result<()> {
        let ticket = self.writer.submit(HistoryOp::Shutdown)?;
        ticket.wait().await?;
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| HistoryError::Storage(format!("history worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for HistoryWorker {
    fn drop(&mut self) {
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

async fn run_history_worker(
    store: Arc<dyn PersistentStore>,
    bound: Arc<CapacityBound>,
    mut rx: mpsc::UnboundedReceiver<HistoryRequest>,
) {
    while let Some(request) = rx.recv().await {
        let name = request.op.name();
        let stop = matches!(request.op, HistoryOp::Shutdown);
        let result = execute(store.as_ref(), &bound, request.op)
            .instrument(info_span!("history.write", op = name))
            .await;
        // A failed step is logged and the pipeline moves on to the next one.
        if let Err(err) = &result {
            event!(Level::ERROR, op = name, error = %err, "history write failed");
        }
        let _ = request.ack.send(result);
        if stop {
            break;
        }
    }
    event!(Level::DEBUG, "history worker stopped");
}

async fn execute(
    store: &dyn PersistentStore,
    bound: &CapacityBound,
    op: HistoryOp,
) -> Result<HistoryReceipt> {
    match op {
        HistoryOp::Initialize { defaults } => {
            let settings = match read_settings(store).await? {
                Some(settings) => settings,
                None => {
                    storage::save(store, StoreKey::Settings, &defaults).await?;
                    defaults
                }
            };
            let capacity = bound.set(i64::try_from(settings.history_capacity).unwrap_or(i64::MAX));

            let existing: Option<Vec<ClosedObjectRecord>> =
                storage::load(store, StoreKey::History).await?;
            let Some(mut history) = existing else {
                storage::save(store, StoreKey::History, &Vec::<ClosedObjectRecord>::new()).await?;
                return Ok(HistoryReceipt { length: 0, capacity });
            };
            let dropped = trim_to(&mut history, capacity);
            if dropped > 0 {
                storage::save(store, StoreKey::History, &history).await?;
                event!(Level::INFO, dropped, capacity, "history trimmed on startup");
            }
            Ok(HistoryReceipt {
                length: history.len(),
                capacity,
            })
        }
        HistoryOp::Append(record) => {
            let capacity = bound.get();
            let mut history = read_history(store).await?;
            let label = record.label.clone();
            history.insert(0, record);
            trim_to(&mut history, capacity);
            storage::save(store, StoreKey::History, &history).await?;
            event!(Level::DEBUG, label = %label, total = history.len(), "closure recorded");
            Ok(HistoryReceipt {
                length: history.len(),
                capacity,
            })
        }
        HistoryOp::SetCapacity(capacity) => {
            let mut settings = read_settings(store).await?.unwrap_or_default();
            if settings.history_capacity != capacity {
                settings.history_capacity = capacity;
                storage::save(store, StoreKey::Settings, &settings).await?;
            }
            let mut history = read_history(store).await?;
            let dropped = trim_to(&mut history, capacity);
            if dropped > 0 {
                storage::save(store, StoreKey::History, &history).await?;
                event!(Level::INFO, dropped, capacity, "history trimmed to new capacity");
            }
            Ok(HistoryReceipt {
                length: history.len(),
                capacity,
            })
        }
        HistoryOp::SetDisplayPageSize(page_size) => {
            let mut settings = read_settings(store).await?.unwrap_or_default();
            settings.display_page_size = page_size.max(1);
            storage::save(store, StoreKey::Settings, &settings).await?;
            receipt(store, bound).await
        }
        HistoryOp::Clear => {
            storage::save(store, StoreKey::History, &Vec::<ClosedObjectRecord>::new()).await?;
            event!(Level::INFO, "history cleared");
            Ok(HistoryReceipt {
                length: 0,
                capacity: bound.get(),
            })
        }
        HistoryOp::Barrier | HistoryOp::Shutdown => receipt(store, bound).await,
    }
}

async fn receipt(store: &dyn PersistentStore, bound: &CapacityBound) -> Result<HistoryReceipt> {
    Ok(HistoryReceipt {
        length: read_history(store).await?.len(),
        capacity: bound.get(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MetadataHint, ObjectId, TrackedObjectRecord};
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn closed(location: &str) -> ClosedObjectRecord {
        let record = TrackedObjectRecord::from_hint(ObjectId(1), &MetadataHint::new(location, ""));
        ClosedObjectRecord::capture(&record, Utc::now())
    }

    #[tokio::test]
    async fn test_appends_newest_first_and_trims_tail() {
        let store = Arc::new(MemoryStore::new());
        let bound = CapacityBound::new(3, 1000);
        let (writer, worker) = HistoryWriter::spawn(store.clone(), bound);

        for i in 1..=4 {
            writer.append(closed(&format!("https://{i}"))).unwrap();
        }
        let receipt = writer.flush().await.unwrap();
        assert_eq!(receipt.length, 3);

        let history = read_history(store.as_ref()).await.unwrap();
        let locations: Vec<&str> = history.iter().map(|r| r.location_ref.as_str()).collect();
        assert_eq!(locations, vec!["https://4", "https://3", "https://2"]);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_does_not_break_pipeline() {
        let store = Arc::new(MemoryStore::new());
        let (writer, worker) = HistoryWriter::spawn(store.clone(), CapacityBound::new(10, 1000));

        store.fail_next_writes(1);
        let first = writer.append(closed("https://lost")).unwrap();
        let second = writer.append(closed("https://kept")).unwrap();

        assert!(first.wait().await.is_err());
        assert_eq!(second.wait().await.unwrap().length, 1);
        let history = read_history(store.as_ref()).await.unwrap();
        assert_eq!(history[0].location_ref, "https://kept");
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_creates_defaults_and_trims() {
        let store = Arc::new(MemoryStore::new());
        let stored: Vec<ClosedObjectRecord> =
            (0..5).map(|i| closed(&format!("https://{i}"))).collect();
        storage::save(store.as_ref(), StoreKey::History, &stored).await.unwrap();
        storage::save(
            store.as_ref(),
            StoreKey::Settings,
            &Settings {
                history_capacity: 2,
                display_page_size: 20,
            },
        )
        .await
        .unwrap();

        let bound = CapacityBound::new(1000, 1000);
        let (writer, worker) = HistoryWriter::spawn(store.clone(), bound.clone());
        let receipt = writer
            .submit(HistoryOp::Initialize {
                defaults: Settings::default(),
            })
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(receipt, HistoryReceipt { length: 2, capacity: 2 });
        assert_eq!(bound.get(), 2);

        let history = read_history(store.as_ref()).await.unwrap();
        assert_eq!(history[0].location_ref, "https://0");
        assert_eq!(history[1].location_ref, "https://1");
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_on_empty_store() {
        let store = Arc::new(MemoryStore::new());
        let (writer, worker) = HistoryWriter::spawn(store.clone(), CapacityBound::new(1000, 1000));
        writer
            .submit(HistoryOp::Initialize {
                defaults: Settings::default(),
            })
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(store.get(StoreKey::History).await.unwrap(), Some(serde_json::json!([])));
        assert_eq!(
            read_settings(store.as_ref()).await.unwrap(),
            Some(Settings::default())
        );
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let store = Arc::new(MemoryStore::new());
        let (writer, worker) = HistoryWriter::spawn(store, CapacityBound::new(10, 10));
        worker.shutdown().await.unwrap();
        assert!(matches!(
            writer.append(closed("https://late")),
            Err(HistoryError::WriterClosed)
        ));
    }
}
