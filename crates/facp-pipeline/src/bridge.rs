//! Bridge lifecycle: construction, startup, supervision, shutdown
//!
//! One [`Bridge`] owns one serial link, one durable queue and one sink.
//! `start()` rehydrates the queue, publishes the device's initial
//! attributes and spawns the workers; `run()` supervises them; `shutdown()`
//! stops serial intake, waits for the workers, writes one final durable
//! snapshot and releases the actuator outputs, in that order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use facp_protocol::{AssemblerConfig, PanelModel, PanelParser};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::actuator::{
    run_heartbeat_loop, run_input_monitor, DigitalInput, DigitalOutput, MonitoredInput,
    PulseActuator, PulseSettings,
};
use crate::error::PipelineError;
use crate::link::{BackoffPolicy, LinkSettings, ReconnectSupervisor};
use crate::listener::{run_serial_listener, EventIngest};
use crate::orchestrator::{Orchestrator, WorkerOutcome};
use crate::queue::{run_snapshot_loop, PersistentQueue, QueueStore};
use crate::sink::{run_drain_loop, EventSink};

/// Timing of the watchdog heartbeat relay
#[derive(Debug, Clone)]
pub struct HeartbeatTiming {
    /// Time the relay stays energized per cycle
    pub high_time: Duration,
    /// Time the relay stays released per cycle
    pub low_time: Duration,
}

/// Everything tunable about one bridge instance
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Serial link parameters
    pub link: LinkSettings,
    /// Reconnection backoff
    pub backoff: BackoffPolicy,
    /// Framing heuristics
    pub assembler: AssemblerConfig,
    /// Durable snapshot location
    pub snapshot_path: PathBuf,
    /// Interval between durable snapshots
    pub snapshot_interval: Duration,
    /// Watchdog relay timing; `None` disables the heartbeat worker
    pub heartbeat: Option<HeartbeatTiming>,
    /// Sampling interval for monitored inputs
    pub monitor_interval: Duration,
    /// Silence relay pulse
    pub silence: PulseSettings,
    /// Reset relay pulse
    pub reset: PulseSettings,
}

/// The pins a bridge drives and samples
pub struct BridgeHardware {
    /// Silence relay output
    pub silence_pin: Arc<dyn DigitalOutput>,
    /// Reset relay output
    pub reset_pin: Arc<dyn DigitalOutput>,
    /// Watchdog relay output, if the heartbeat worker is enabled
    pub heartbeat_pin: Option<Arc<dyn DigitalOutput>>,
    /// Inputs sampled by the monitor worker (may be empty)
    pub inputs: Vec<(MonitoredInput, Arc<dyn DigitalInput>)>,
}

/// Parts consumed when the workers are spawned
struct StartupParts {
    supervisor: ReconnectSupervisor,
    ingest: EventIngest,
    snapshot_interval: Duration,
    heartbeat: Option<(Arc<dyn DigitalOutput>, HeartbeatTiming)>,
    monitor: Option<(Vec<(MonitoredInput, Arc<dyn DigitalInput>)>, Duration)>,
}

/// The panel-to-sink bridge
pub struct Bridge {
    model: PanelModel,
    queue: Arc<PersistentQueue>,
    store: Arc<QueueStore>,
    orchestrator: Orchestrator,
    sink: Arc<dyn EventSink>,
    silence: Arc<PulseActuator>,
    reset: Arc<PulseActuator>,
    silence_hold: Duration,
    pending: Option<StartupParts>,
}

impl Bridge {
    /// Wire up a bridge. Nothing runs until [`Bridge::start`].
    pub fn new(
        config: BridgeConfig,
        parser: Box<dyn PanelParser>,
        sink: Arc<dyn EventSink>,
        hardware: BridgeHardware,
    ) -> Self {
        let model = parser.model();
        let queue = Arc::new(PersistentQueue::new());
        let store = Arc::new(QueueStore::json(config.snapshot_path.clone()));

        let supervisor =
            ReconnectSupervisor::new(config.link.clone(), config.backoff.clone(), Arc::clone(&sink));
        let ingest = EventIngest::new(parser, config.assembler.clone(), Arc::clone(&queue));

        let silence = Arc::new(PulseActuator::new(
            "silence_relay",
            hardware.silence_pin,
            config.silence.clone(),
            Arc::clone(&queue),
        ));
        let reset = Arc::new(PulseActuator::new(
            "reset_relay",
            hardware.reset_pin,
            config.reset.clone(),
            Arc::clone(&queue),
        ));

        let heartbeat = match (hardware.heartbeat_pin, config.heartbeat) {
            (Some(pin), Some(timing)) => Some((pin, timing)),
            _ => None,
        };
        let monitor = if hardware.inputs.is_empty() {
            None
        } else {
            Some((hardware.inputs, config.monitor_interval))
        };

        Self {
            model,
            queue,
            store,
            orchestrator: Orchestrator::new(),
            sink,
            silence,
            reset,
            silence_hold: config.silence.hold,
            pending: Some(StartupParts {
                supervisor,
                ingest,
                snapshot_interval: config.snapshot_interval,
                heartbeat,
                monitor,
            }),
        }
    }

    /// The panel model this bridge parses
    pub fn model(&self) -> PanelModel {
        self.model
    }

    /// The outbound queue (exposed for the component draining toward the
    /// sink and for tests)
    pub fn queue(&self) -> Arc<PersistentQueue> {
        Arc::clone(&self.queue)
    }

    /// The silence relay, for the external RPC dispatch layer
    pub fn silence_relay(&self) -> Arc<PulseActuator> {
        Arc::clone(&self.silence)
    }

    /// The reset relay, for the external RPC dispatch layer
    pub fn reset_relay(&self) -> Arc<PulseActuator> {
        Arc::clone(&self.reset)
    }

    /// Rehydrate the queue and spawn all workers.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        let Some(parts) = self.pending.take() else {
            warn!("Bridge already started");
            return Ok(());
        };

        info!("Starting bridge for {} panel", self.model.name());

        match self.store.load(&self.queue).await {
            Ok(count) if count > 0 => info!("Restored {} pending items from snapshot", count),
            Ok(_) => info!("No pending items to restore"),
            // A corrupt or unreadable snapshot must not block live
            // processing; the queue starts empty instead.
            Err(e) => error!("Failed to restore queue snapshot: {}", e),
        }

        self.publish_initial_attributes().await;

        let ingest = parts.ingest;
        let supervisor = parts.supervisor;
        self.orchestrator.register("serial-listener", true, move |shutdown| {
            run_serial_listener(supervisor, ingest, shutdown)
        });

        {
            let queue = Arc::clone(&self.queue);
            let store = Arc::clone(&self.store);
            let every = parts.snapshot_interval;
            self.orchestrator.register("queue-snapshot", false, move |shutdown| {
                run_snapshot_loop(queue, store, every, shutdown)
            });
        }

        {
            let queue = Arc::clone(&self.queue);
            let sink = Arc::clone(&self.sink);
            self.orchestrator.register("sink-drain", false, move |shutdown| {
                run_drain_loop(queue, sink, shutdown)
            });
        }

        if let Some((pin, timing)) = parts.heartbeat {
            self.orchestrator.register("heartbeat-relay", false, move |shutdown| {
                run_heartbeat_loop(pin, timing.high_time, timing.low_time, shutdown)
            });
        }

        if let Some((inputs, every)) = parts.monitor {
            let queue = Arc::clone(&self.queue);
            self.orchestrator.register("input-monitor", false, move |shutdown| {
                run_input_monitor(inputs, every, queue, shutdown)
            });
        }

        self.orchestrator.start_all();
        Ok(())
    }

    /// Supervise the workers until shutdown is requested (by
    /// [`Bridge::request_shutdown`] or by a critical worker dying).
    pub async fn run(&mut self) {
        self.orchestrator.supervise().await;
    }

    /// Request cooperative shutdown. Idempotent.
    pub fn request_shutdown(&self) {
        self.orchestrator.request_shutdown();
    }

    /// Stop the bridge: no more serial intake, workers joined, one final
    /// durable snapshot, actuators released.
    pub async fn shutdown(self, timeout: Duration) -> Vec<(String, WorkerOutcome)> {
        info!("Initiating graceful shutdown...");
        self.orchestrator.request_shutdown();
        let outcomes = self.orchestrator.await_termination(timeout).await;

        match self.store.save(&self.queue).await {
            Ok(count) => info!("Final snapshot saved ({} pending items)", count),
            Err(e) => error!("Final queue snapshot failed: {}", e),
        }

        self.silence.release();
        self.reset.release();

        info!("Graceful shutdown completed");
        outcomes
    }

    async fn publish_initial_attributes(&self) {
        let mut attributes = Map::new();
        attributes.insert("device_ready".to_string(), Value::Bool(true));
        attributes.insert(
            "panel_model".to_string(),
            Value::String(self.model.name().to_string()),
        );
        attributes.insert("silence_relay_configured".to_string(), Value::Bool(true));
        attributes.insert(
            "silence_activation_time_secs".to_string(),
            Value::from(self.silence_hold.as_secs()),
        );
        self.queue
            .enqueue(crate::queue::QueueItem::Attributes(attributes))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimulatedOutput;
    use crate::sink::MemorySink;

    fn test_config(name: &str) -> BridgeConfig {
        BridgeConfig {
            link: LinkSettings::new("/dev/facp-bridge-test-does-not-exist", 9600),
            backoff: BackoffPolicy {
                base: Duration::from_millis(10),
                max: Duration::from_millis(50),
            },
            assembler: AssemblerConfig::default(),
            snapshot_path: std::env::temp_dir().join(format!(
                "facp-bridge-{}-{}.json",
                name,
                std::process::id()
            )),
            snapshot_interval: Duration::from_millis(50),
            heartbeat: Some(HeartbeatTiming {
                high_time: Duration::from_millis(10),
                low_time: Duration::from_millis(10),
            }),
            monitor_interval: Duration::from_millis(20),
            silence: PulseSettings {
                active_high: true,
                hold: Duration::from_millis(10),
            },
            reset: PulseSettings {
                active_high: true,
                hold: Duration::from_millis(10),
            },
        }
    }

    fn test_hardware() -> BridgeHardware {
        BridgeHardware {
            silence_pin: Arc::new(SimulatedOutput::new("silence")),
            reset_pin: Arc::new(SimulatedOutput::new("reset")),
            heartbeat_pin: Some(Arc::new(SimulatedOutput::new("alive"))),
            inputs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_with_unreachable_port() {
        let sink = Arc::new(MemorySink::new());
        let table = facp_protocol::SeverityTable::default();
        let parser =
            facp_protocol::create_panel_parser(facp_protocol::PanelModel::EdwardsIo1000, table);

        let config = test_config("lifecycle");
        let snapshot_path = config.snapshot_path.clone();
        let mut bridge = Bridge::new(
            config,
            parser,
            Arc::clone(&sink) as Arc<dyn EventSink>,
            test_hardware(),
        );

        bridge.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let outcomes = bridge.shutdown(Duration::from_secs(2)).await;
        assert!(outcomes
            .iter()
            .all(|(_, outcome)| *outcome == WorkerOutcome::Completed));

        // The supervisor published link transitions while retrying the
        // unreachable port
        assert!(!sink.connectivity().is_empty());
        // The initial attributes were drained to the sink
        assert!(sink
            .attributes()
            .iter()
            .any(|a| a.get("device_ready") == Some(&Value::Bool(true))));
        // The final snapshot exists on disk
        assert!(snapshot_path.exists());

        let _ = tokio::fs::remove_file(snapshot_path).await;
    }
}
