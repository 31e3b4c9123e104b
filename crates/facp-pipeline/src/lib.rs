//! FACP Delivery Pipeline
//!
//! Durable, at-least-once delivery between a fire-alarm panel's serial
//! link and a telemetry sink:
//!
//! - **link**: serial open/close lifecycle with deterministic capped
//!   exponential backoff and observable connection state
//! - **listener**: the sole owner of the link; decodes lines (latin-1,
//!   total over every byte value), assembles frames, parses events,
//!   enqueues telemetry
//! - **queue**: in-memory FIFO with periodic full snapshots to a single
//!   durable file; rehydrated on startup
//! - **sink**: abstract fire-and-forget publish surface plus the drain
//!   worker feeding it
//! - **actuator**: relay pulses behind a minimal digital-pin capability,
//!   single-flight per relay
//! - **orchestrator**: one tokio task per loop, one shared cooperative
//!   shutdown signal, liveness supervision
//! - **bridge**: ties the above into a `start()`/`run()`/`shutdown()`
//!   lifecycle
//!
//! Delivery is at-least-once: events enqueued after the last snapshot and
//! before a crash are lost, snapshotted-but-delivered events may be
//! redelivered. The one invariant held everywhere is that bytes read from
//! the link are only ever discarded on an explicit, logged recovery path.

pub mod actuator;
pub mod bridge;
pub mod error;
pub mod link;
pub mod listener;
pub mod orchestrator;
pub mod queue;
pub mod sink;

pub use actuator::{
    DigitalInput, DigitalOutput, MonitoredInput, PulseActuator, PulseSettings, SimulatedInput,
    SimulatedOutput,
};
pub use bridge::{Bridge, BridgeConfig, BridgeHardware, HeartbeatTiming};
pub use error::PipelineError;
pub use link::{BackoffPolicy, ConnectionState, LinkSettings, ReconnectSupervisor};
pub use listener::{EventIngest, StreamEnd};
pub use orchestrator::{Orchestrator, WorkerOutcome};
pub use queue::{JsonSnapshotCodec, PersistentQueue, QueueItem, QueueStore, SnapshotCodec};
pub use sink::{EventSink, MemorySink};
