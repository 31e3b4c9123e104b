//! Outbound publish surface
//!
//! The pipeline never talks to the cloud transport directly; it hands
//! every outbound item to an [`EventSink`]. All three publish calls are
//! fire-and-forget from the pipeline's perspective; transport-side
//! retry/backoff belongs to the sink implementation.

use std::sync::Arc;
use std::time::Duration;

use facp_protocol::PanelEvent;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::info;

use crate::link::ConnectionState;
use crate::queue::{PersistentQueue, QueueItem};

/// How long one dequeue wait may block before re-checking for shutdown
const DRAIN_WAIT: Duration = Duration::from_secs(1);

/// Abstract telemetry/attribute/connectivity sink
pub trait EventSink: Send + Sync {
    /// Publish one parsed panel event
    fn publish_telemetry(&self, event: &PanelEvent);

    /// Publish a set of device attributes
    fn publish_attributes(&self, attributes: &Map<String, Value>);

    /// Publish the serial link's connection state
    fn publish_connectivity(&self, state: ConnectionState);
}

/// Drain the queue into the sink until shutdown is requested.
///
/// Items left in the queue when the loop stops stay queued; the final
/// durable snapshot written during shutdown preserves them for the next
/// run (at-least-once delivery).
pub async fn run_drain_loop(
    queue: Arc<PersistentQueue>,
    sink: Arc<dyn EventSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Drain loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            item = queue.dequeue(DRAIN_WAIT) => {
                match item {
                    Some(QueueItem::Telemetry(event)) => sink.publish_telemetry(&event),
                    Some(QueueItem::Attributes(attributes)) => {
                        sink.publish_attributes(&attributes)
                    }
                    None => {}
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Drain loop stopped");
}

/// Recording sink for tests
#[derive(Debug, Default)]
pub struct MemorySink {
    telemetry: std::sync::Mutex<Vec<PanelEvent>>,
    attributes: std::sync::Mutex<Vec<Map<String, Value>>>,
    connectivity: std::sync::Mutex<Vec<ConnectionState>>,
}

impl MemorySink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Telemetry published so far
    pub fn telemetry(&self) -> Vec<PanelEvent> {
        self.telemetry.lock().unwrap().clone()
    }

    /// Attribute sets published so far
    pub fn attributes(&self) -> Vec<Map<String, Value>> {
        self.attributes.lock().unwrap().clone()
    }

    /// Connectivity transitions published so far
    pub fn connectivity(&self) -> Vec<ConnectionState> {
        self.connectivity.lock().unwrap().clone()
    }
}

impl EventSink for MemorySink {
    fn publish_telemetry(&self, event: &PanelEvent) {
        self.telemetry.lock().unwrap().push(event.clone());
    }

    fn publish_attributes(&self, attributes: &Map<String, Value>) {
        self.attributes.lock().unwrap().push(attributes.clone());
    }

    fn publish_connectivity(&self, state: ConnectionState) {
        self.connectivity.lock().unwrap().push(state);
    }
}
