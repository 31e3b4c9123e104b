//! Durable ordered work queue
//!
//! An in-memory FIFO of outbound items backed by a periodic full snapshot
//! to a single file. On startup the queue is rehydrated from the last
//! snapshot, which gives at-least-once delivery across restarts: items
//! enqueued after the last snapshot and before a crash are lost, items
//! snapshotted but already delivered may be redelivered. Consumers must
//! tolerate duplicate telemetry.
//!
//! The mutex around the deque is held only for O(1) push/pop and for the
//! duration of the snapshot copy. Encoding and file I/O always happen
//! outside the lock, so snapshotting and draining cannot stall each other.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use facp_protocol::PanelEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::PipelineError;

/// One outbound unit of work, owned by the queue from enqueue until a
/// successful dequeue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueItem {
    /// A parsed panel event bound for the telemetry stream
    Telemetry(PanelEvent),
    /// A set of device attributes
    Attributes(Map<String, Value>),
}

/// In-memory FIFO with an interruptible blocking dequeue
#[derive(Debug, Default)]
pub struct PersistentQueue {
    items: Mutex<VecDeque<QueueItem>>,
    ready: Notify,
}

impl PersistentQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one item and wake a waiting consumer
    pub async fn enqueue(&self, item: QueueItem) {
        self.items.lock().await.push_back(item);
        self.ready.notify_one();
    }

    /// Pop the oldest item, waiting up to `wait` for one to arrive
    pub async fn dequeue(&self, wait: Duration) -> Option<QueueItem> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(item) = self.items.lock().await.pop_front() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, self.ready.notified())
                .await
                .is_err()
            {
                return self.items.lock().await.pop_front();
            }
        }
    }

    /// Number of pending items
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// True if no items are pending
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Copy the current contents in order. The lock is held only for the
    /// copy, never for encoding or I/O.
    pub async fn snapshot(&self) -> Vec<QueueItem> {
        self.items.lock().await.iter().cloned().collect()
    }

    /// Append previously snapshotted items (startup rehydration)
    pub async fn restore(&self, items: Vec<QueueItem>) {
        let mut guard = self.items.lock().await;
        guard.extend(items);
        drop(guard);
        self.ready.notify_one();
    }
}

/// Serialization seam for the durable snapshot format
pub trait SnapshotCodec: Send + Sync {
    /// Encode the queue contents to bytes
    fn encode(&self, items: &[QueueItem]) -> Result<Vec<u8>, PipelineError>;

    /// Decode a previously written snapshot
    fn decode(&self, bytes: &[u8]) -> Result<Vec<QueueItem>, PipelineError>;
}

/// JSON snapshot format
#[derive(Debug, Default)]
pub struct JsonSnapshotCodec;

impl SnapshotCodec for JsonSnapshotCodec {
    fn encode(&self, items: &[QueueItem]) -> Result<Vec<u8>, PipelineError> {
        Ok(serde_json::to_vec(items)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<QueueItem>, PipelineError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Durable side of the queue: full overwrite-on-snapshot, full
/// read-on-load
pub struct QueueStore {
    path: PathBuf,
    codec: Box<dyn SnapshotCodec>,
}

impl QueueStore {
    /// Create a store writing snapshots with the given codec
    pub fn new(path: impl Into<PathBuf>, codec: Box<dyn SnapshotCodec>) -> Self {
        Self {
            path: path.into(),
            codec,
        }
    }

    /// Create a store using the JSON codec
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Box::new(JsonSnapshotCodec))
    }

    /// Snapshot path on disk
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Write a full snapshot of the queue. The snapshot lands under a
    /// temporary name first and is renamed over the previous one, so a
    /// crash mid-write never corrupts the last good snapshot.
    pub async fn save(&self, queue: &PersistentQueue) -> Result<usize, PipelineError> {
        let items = queue.snapshot().await;
        let bytes = self.codec.encode(&items)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(PipelineError::Persistence)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(PipelineError::Persistence)?;
        Ok(items.len())
    }

    /// Rehydrate the queue from the last snapshot. A missing snapshot
    /// file is a fresh start, not an error.
    pub async fn load(&self, queue: &PersistentQueue) -> Result<usize, PipelineError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PipelineError::Persistence(e)),
        };
        let items = self.codec.decode(&bytes)?;
        let count = items.len();
        queue.restore(items).await;
        Ok(count)
    }
}

/// Periodically snapshot the queue until shutdown is requested.
///
/// A failed snapshot is an error log, never a stop: the in-memory queue
/// keeps operating and deliverability degrades to losing more on a crash.
pub async fn run_snapshot_loop(
    queue: Arc<PersistentQueue>,
    store: Arc<QueueStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Queue snapshot loop started (interval {:?})", every);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(every) => {
                match store.save(&queue).await {
                    Ok(count) => debug!("Snapshotted {} pending items", count),
                    Err(e) => error!("Queue snapshot failed: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Queue snapshot loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn event(id: &str) -> QueueItem {
        QueueItem::Telemetry(PanelEvent {
            id: id.to_string(),
            description: "ZONA 1".to_string(),
            severity: 2,
            panel_timestamp: "12:30P 102325".to_string(),
            received_at: SystemTime::now(),
        })
    }

    fn temp_store(name: &str) -> QueueStore {
        let path = std::env::temp_dir().join(format!(
            "facp-queue-{}-{}.json",
            name,
            std::process::id()
        ));
        QueueStore::json(path)
    }

    fn telemetry_id(item: &QueueItem) -> &str {
        match item {
            QueueItem::Telemetry(ev) => &ev.id,
            QueueItem::Attributes(_) => panic!("expected telemetry item"),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = PersistentQueue::new();
        queue.enqueue(event("A")).await;
        queue.enqueue(event("B")).await;

        let first = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        let second = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(telemetry_id(&first), "A");
        assert_eq!(telemetry_id(&second), "B");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_empty() {
        let queue = PersistentQueue::new();
        assert!(queue.dequeue(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(PersistentQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                queue.enqueue(event("LATE")).await;
            })
        };

        let item = queue.dequeue(Duration::from_secs(2)).await;
        assert!(item.is_some());
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_preserves_order() {
        let store = temp_store("round-trip");
        let queue = PersistentQueue::new();
        for id in ["A", "B", "C"] {
            queue.enqueue(event(id)).await;
        }

        let saved = store.save(&queue).await.unwrap();
        assert_eq!(saved, 3);

        let fresh = PersistentQueue::new();
        let loaded = store.load(&fresh).await.unwrap();
        assert_eq!(loaded, 3);

        for expected in ["A", "B", "C"] {
            let item = fresh.dequeue(Duration::from_millis(10)).await.unwrap();
            assert_eq!(telemetry_id(&item), expected);
        }

        let _ = tokio::fs::remove_file(store.path()).await;
    }

    #[tokio::test]
    async fn test_snapshot_does_not_drain_live_queue() {
        let store = temp_store("non-destructive");
        let queue = PersistentQueue::new();
        queue.enqueue(event("A")).await;

        store.save(&queue).await.unwrap();
        assert_eq!(queue.len().await, 1);

        let _ = tokio::fs::remove_file(store.path()).await;
    }

    #[tokio::test]
    async fn test_load_missing_snapshot_is_empty_start() {
        let store = QueueStore::json(std::env::temp_dir().join("facp-queue-does-not-exist.json"));
        let queue = PersistentQueue::new();
        assert_eq!(store.load(&queue).await.unwrap(), 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_attributes_round_trip() {
        let store = temp_store("attributes");
        let queue = PersistentQueue::new();
        let mut attributes = Map::new();
        attributes.insert("device_ready".to_string(), Value::Bool(true));
        queue.enqueue(QueueItem::Attributes(attributes.clone())).await;

        store.save(&queue).await.unwrap();
        let fresh = PersistentQueue::new();
        store.load(&fresh).await.unwrap();

        let item = fresh.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(item, QueueItem::Attributes(attributes));

        let _ = tokio::fs::remove_file(store.path()).await;
    }
}
