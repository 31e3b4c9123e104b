//! Structured-log sink
//!
//! Stands at the boundary where the cloud transport plugs in: a real
//! deployment swaps this for an MQTT/ThingsBoard client implementing the
//! same [`EventSink`] trait. Every publish is rendered as a structured
//! log line, which also makes the daemon usable as a diagnostics tap on a
//! bench.

use facp_pipeline::{ConnectionState, EventSink};
use facp_protocol::PanelEvent;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Sink that renders every publish as a log line
#[derive(Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create the sink
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn publish_telemetry(&self, event: &PanelEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!("telemetry: {}", json),
            Err(e) => warn!("telemetry (unserializable, {}): {:?}", e, event),
        }
    }

    fn publish_attributes(&self, attributes: &Map<String, Value>) {
        info!("attributes: {}", serde_json::Value::Object(attributes.clone()));
    }

    fn publish_connectivity(&self, state: ConnectionState) {
        info!("connectivity: {}", state.name());
    }
}
