//! Relay actuation behind a minimal digital-pin abstraction
//!
//! Actuator logic never touches a hardware library directly; it drives a
//! [`DigitalOutput`] capability (set-high / set-low / read-state) so the
//! same code runs against a real pin backend or the simulated one shipped
//! here for hosts without GPIO.
//!
//! A [`PulseActuator`] fires a relay for a fixed hold time. Activations
//! are single-flight: a second request while a pulse is in flight is
//! rejected, not queued, so two pulses can never overlap on the same
//! line. A started pulse always runs to completion: shutdown waits at
//! the pulse boundary, never mid-pulse, to avoid leaving the relay in an
//! undefined state.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::queue::{PersistentQueue, QueueItem};

/// Minimal digital output capability
pub trait DigitalOutput: Send + Sync {
    /// Drive the pin high
    fn set_high(&self) -> io::Result<()>;

    /// Drive the pin low
    fn set_low(&self) -> io::Result<()>;

    /// Read back the current level
    fn is_high(&self) -> io::Result<bool>;
}

/// Minimal digital input capability
pub trait DigitalInput: Send + Sync {
    /// Read the pin level
    fn read(&self) -> io::Result<bool>;
}

/// In-memory pin for hosts without GPIO hardware
#[derive(Debug)]
pub struct SimulatedOutput {
    name: String,
    level: AtomicBool,
}

impl SimulatedOutput {
    /// Create a simulated pin, initially low
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: AtomicBool::new(false),
        }
    }
}

impl DigitalOutput for SimulatedOutput {
    fn set_high(&self) -> io::Result<()> {
        self.level.store(true, Ordering::SeqCst);
        debug!("[SIMULATION] {} set HIGH", self.name);
        Ok(())
    }

    fn set_low(&self) -> io::Result<()> {
        self.level.store(false, Ordering::SeqCst);
        debug!("[SIMULATION] {} set LOW", self.name);
        Ok(())
    }

    fn is_high(&self) -> io::Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// In-memory input pin with a settable level
#[derive(Debug, Default)]
pub struct SimulatedInput {
    level: AtomicBool,
}

impl SimulatedInput {
    /// Create a simulated input, initially low
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level the next `read` will observe
    pub fn set(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }
}

impl DigitalInput for SimulatedInput {
    fn read(&self) -> io::Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Electrical configuration of one relay pulse
#[derive(Debug, Clone)]
pub struct PulseSettings {
    /// True when the relay energizes on a high level
    pub active_high: bool,
    /// How long the relay stays energized per activation
    pub hold: Duration,
}

/// A relay fired for a fixed hold time, single-flight
pub struct PulseActuator {
    name: String,
    output: Arc<dyn DigitalOutput>,
    settings: PulseSettings,
    queue: Arc<PersistentQueue>,
    in_flight: Mutex<()>,
}

impl PulseActuator {
    /// Create an actuator over the given pin
    pub fn new(
        name: impl Into<String>,
        output: Arc<dyn DigitalOutput>,
        settings: PulseSettings,
        queue: Arc<PersistentQueue>,
    ) -> Self {
        Self {
            name: name.into(),
            output,
            settings,
            queue,
            in_flight: Mutex::new(()),
        }
    }

    /// Actuator name (used in published attribute keys)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fire one pulse: drive the active level, hold, release.
    ///
    /// Rejects with [`PipelineError::ActuatorBusy`] if a pulse is already
    /// in flight. The hold is not interruptible; a started pulse runs to
    /// completion even if shutdown is requested meanwhile.
    pub async fn activate(&self) -> Result<(), PipelineError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("{} pulse already in progress, rejecting new request", self.name);
            return Err(PipelineError::ActuatorBusy);
        };

        info!(
            "Activating {} relay for {:?}",
            self.name, self.settings.hold
        );
        self.publish_state(true).await;

        if let Err(e) = self.drive(true) {
            error!("Error driving {} relay: {}", self.name, e);
            let _ = self.drive(false);
            self.publish_state(false).await;
            return Err(PipelineError::Io(e));
        }

        sleep(self.settings.hold).await;

        let released = self.drive(false);
        self.publish_state(false).await;
        match released {
            Ok(()) => {
                info!("{} relay released", self.name);
                Ok(())
            }
            Err(e) => {
                error!("Error releasing {} relay: {}", self.name, e);
                Err(PipelineError::Io(e))
            }
        }
    }

    /// Force the inactive level. Shutdown path; errors are logged, not
    /// propagated.
    pub fn release(&self) {
        if let Err(e) = self.drive(false) {
            error!("Error releasing {} relay during shutdown: {}", self.name, e);
        }
    }

    fn drive(&self, active: bool) -> io::Result<()> {
        if active == self.settings.active_high {
            self.output.set_high()
        } else {
            self.output.set_low()
        }
    }

    async fn publish_state(&self, active: bool) {
        let mut attributes = Map::new();
        attributes.insert(format!("{}_active", self.name), Value::Bool(active));
        self.queue.enqueue(QueueItem::Attributes(attributes)).await;
    }
}

/// Continuously toggle a watchdog relay: active for `high_time`, inactive
/// for `low_time`. Interruptible at the phase boundaries; leaves the pin
/// low on exit.
pub async fn run_heartbeat_loop(
    output: Arc<dyn DigitalOutput>,
    high_time: Duration,
    low_time: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Heartbeat relay loop started");
    'outer: while !*shutdown.borrow() {
        for (level, hold) in [(true, high_time), (false, low_time)] {
            let result = if level {
                output.set_high()
            } else {
                output.set_low()
            };
            if let Err(e) = result {
                error!("Error toggling heartbeat relay: {}", e);
            }
            tokio::select! {
                _ = sleep(hold) => {}
                _ = shutdown.changed() => break 'outer,
            }
        }
    }
    if let Err(e) = output.set_low() {
        error!("Error parking heartbeat relay low: {}", e);
    }
    info!("Heartbeat relay loop stopped");
}

/// Electrical configuration of one monitored input
#[derive(Debug, Clone)]
pub struct MonitoredInput {
    /// Attribute key published for this input
    pub name: String,
    /// True when the input reads high in its active state
    pub active_high: bool,
}

/// Periodically sample alarm/trouble inputs and queue their state as
/// device attributes.
pub async fn run_input_monitor(
    inputs: Vec<(MonitoredInput, Arc<dyn DigitalInput>)>,
    every: Duration,
    queue: Arc<PersistentQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Input monitor started ({} pins)", inputs.len());
    loop {
        tokio::select! {
            _ = sleep(every) => {
                let mut attributes = Map::new();
                for (input, pin) in &inputs {
                    match pin.read() {
                        Ok(level) => {
                            let active = level == input.active_high;
                            attributes.insert(
                                format!("{}_active", input.name),
                                Value::Bool(active),
                            );
                        }
                        Err(e) => warn!("Error reading {} input: {}", input.name, e),
                    }
                }
                if !attributes.is_empty() {
                    queue.enqueue(QueueItem::Attributes(attributes)).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Input monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actuator(
        output: Arc<SimulatedOutput>,
        queue: Arc<PersistentQueue>,
        active_high: bool,
        hold: Duration,
    ) -> PulseActuator {
        PulseActuator::new(
            "silence_relay",
            output as Arc<dyn DigitalOutput>,
            PulseSettings { active_high, hold },
            queue,
        )
    }

    #[tokio::test]
    async fn test_pulse_drives_pin_and_publishes_state() {
        let pin = Arc::new(SimulatedOutput::new("silence"));
        let queue = Arc::new(PersistentQueue::new());
        let relay = actuator(
            Arc::clone(&pin),
            Arc::clone(&queue),
            true,
            Duration::from_millis(10),
        );

        relay.activate().await.unwrap();

        assert!(!pin.is_high().unwrap());
        // Two attribute items: active=true then active=false
        let first = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        let second = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(
            first,
            QueueItem::Attributes(
                [("silence_relay_active".to_string(), Value::Bool(true))]
                    .into_iter()
                    .collect()
            )
        );
        assert_eq!(
            second,
            QueueItem::Attributes(
                [("silence_relay_active".to_string(), Value::Bool(false))]
                    .into_iter()
                    .collect()
            )
        );
    }

    #[tokio::test]
    async fn test_active_low_pulse_parks_high() {
        let pin = Arc::new(SimulatedOutput::new("reset"));
        let queue = Arc::new(PersistentQueue::new());
        let relay = actuator(
            Arc::clone(&pin),
            queue,
            false,
            Duration::from_millis(10),
        );

        relay.activate().await.unwrap();
        assert!(pin.is_high().unwrap());
    }

    #[tokio::test]
    async fn test_second_activation_is_rejected_not_queued() {
        let pin = Arc::new(SimulatedOutput::new("silence"));
        let queue = Arc::new(PersistentQueue::new());
        let relay = Arc::new(actuator(
            Arc::clone(&pin),
            queue,
            true,
            Duration::from_millis(100),
        ));

        let first = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.activate().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = relay.activate().await;
        assert!(matches!(second, Err(PipelineError::ActuatorBusy)));

        first.await.unwrap().unwrap();
        // After the first pulse completes a new activation is accepted
        relay.activate().await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_toggles_and_parks_low() {
        let pin = Arc::new(SimulatedOutput::new("alive"));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = {
            let pin = Arc::clone(&pin) as Arc<dyn DigitalOutput>;
            tokio::spawn(run_heartbeat_loop(
                pin,
                Duration::from_millis(10),
                Duration::from_millis(10),
                shutdown_rx,
            ))
        };

        tokio::time::sleep(Duration::from_millis(15)).await;
        let _ = shutdown_tx.send(true);
        worker.await.unwrap();

        assert!(!pin.is_high().unwrap());
    }

    #[tokio::test]
    async fn test_input_monitor_publishes_active_states() {
        let alarm = Arc::new(SimulatedInput::new());
        let trouble = Arc::new(SimulatedInput::new());
        alarm.set(true);

        let queue = Arc::new(PersistentQueue::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inputs = vec![
            (
                MonitoredInput {
                    name: "alarm".to_string(),
                    active_high: true,
                },
                Arc::clone(&alarm) as Arc<dyn DigitalInput>,
            ),
            (
                MonitoredInput {
                    name: "trouble".to_string(),
                    active_high: true,
                },
                Arc::clone(&trouble) as Arc<dyn DigitalInput>,
            ),
        ];

        let worker = tokio::spawn(run_input_monitor(
            inputs,
            Duration::from_millis(10),
            Arc::clone(&queue),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(25)).await;
        let _ = shutdown_tx.send(true);
        worker.await.unwrap();

        let item = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        let QueueItem::Attributes(attributes) = item else {
            panic!("expected attributes item");
        };
        assert_eq!(attributes.get("alarm_active"), Some(&Value::Bool(true)));
        assert_eq!(attributes.get("trouble_active"), Some(&Value::Bool(false)));
    }
}
