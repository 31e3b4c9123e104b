//! Serial link lifecycle and reconnection
//!
//! The supervisor is the only component that opens or closes the physical
//! link. Consumers receive an open [`SerialStream`] and hand control back
//! here when it faults; the supervisor then retries with deterministic
//! capped exponential backoff (no jitter) until the link opens again or
//! shutdown is requested.
//!
//! Every state transition is observable two ways: through a `watch`
//! channel for in-process readers, and through
//! [`EventSink::publish_connectivity`] so downstream consumers see link
//! health without polling the serial subsystem.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::sink::EventSink;

/// Health of the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never opened, or deliberately closed
    Closed,
    /// An open attempt is in progress
    Opening,
    /// The link is up
    Open,
    /// The link was up, faulted, and is inside the retry cycle
    Degraded,
}

impl ConnectionState {
    /// Returns a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Opening => "opening",
            ConnectionState::Open => "open",
            ConnectionState::Degraded => "degraded",
        }
    }
}

/// Deterministic capped exponential backoff
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the second attempt (the first retry waits exactly this)
    pub base: Duration,
    /// Ceiling for the computed delay; the attempt counter itself is
    /// uncapped
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given zero-based attempt: `min(base * 2^attempt, max)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }
}

/// Physical serial parameters for the panel link
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Device path (e.g. `/dev/ttyUSB0`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub data_bits: DataBits,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Bound on one blocking read; also the idle-flush tick interval
    pub read_timeout: Duration,
}

impl LinkSettings {
    /// 8N1 settings with a 500 ms read timeout
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: Duration::from_millis(500),
        }
    }
}

/// Owns the link lifecycle: open, close, and the backoff retry cycle
pub struct ReconnectSupervisor {
    settings: LinkSettings,
    backoff: BackoffPolicy,
    attempt: u32,
    last_failure: Option<Instant>,
    faulted: bool,
    state_tx: watch::Sender<ConnectionState>,
    sink: Arc<dyn EventSink>,
}

impl ReconnectSupervisor {
    /// Create a supervisor for the given link
    pub fn new(settings: LinkSettings, backoff: BackoffPolicy, sink: Arc<dyn EventSink>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            settings,
            backoff,
            attempt: 0,
            last_failure: None,
            faulted: false,
            state_tx,
            sink,
        }
    }

    /// The link settings this supervisor opens with
    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to link state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Reconnection attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// When the most recent open attempt failed, if any
    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Perform one open attempt.
    ///
    /// Success resets the backoff counter and transitions to `Open`;
    /// failure transitions to `Closed` (never opened) or `Degraded`
    /// (retrying after a fault) and returns the error.
    pub fn open(&mut self) -> Result<SerialStream, PipelineError> {
        self.transition(ConnectionState::Opening);
        match self.try_open() {
            Ok(stream) => {
                self.attempt = 0;
                self.last_failure = None;
                self.faulted = false;
                self.transition(ConnectionState::Open);
                info!(
                    "Serial port {} open at {} baud",
                    self.settings.port, self.settings.baud_rate
                );
                Ok(stream)
            }
            Err(e) => {
                self.transition(self.failure_state());
                Err(e)
            }
        }
    }

    /// Retry opening until success or shutdown.
    ///
    /// Delay between attempts is `min(base * 2^attempt, max)`; the sleep
    /// observes the shutdown signal and returns early. `None` means
    /// shutdown was requested before the link came back.
    pub async fn reconnect(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<SerialStream> {
        while !*shutdown.borrow() {
            match self.open() {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    let delay = self.backoff.delay(self.attempt);
                    self.attempt += 1;
                    self.last_failure = Some(Instant::now());
                    error!(
                        "Error opening serial link: {}. Retrying in {:?} (attempt {})",
                        e, delay, self.attempt
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.changed() => return None,
                    }
                }
            }
        }
        None
    }

    /// Record a fault on a previously open link (the stream itself is
    /// closed by dropping it)
    pub fn mark_fault(&mut self) {
        self.faulted = true;
        self.transition(ConnectionState::Degraded);
    }

    /// Record a deliberate close (shutdown path)
    pub fn close(&mut self) {
        self.faulted = false;
        self.transition(ConnectionState::Closed);
        info!("Serial port closed");
    }

    fn failure_state(&self) -> ConnectionState {
        if self.faulted {
            ConnectionState::Degraded
        } else {
            ConnectionState::Closed
        }
    }

    fn try_open(&self) -> Result<SerialStream, PipelineError> {
        let stream = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .parity(self.settings.parity)
            .stop_bits(self.settings.stop_bits)
            .timeout(self.settings.read_timeout)
            .open_native_async()?;
        Ok(stream)
    }

    fn transition(&self, next: ConnectionState) {
        let prev = *self.state_tx.borrow();
        if prev == next {
            return;
        }
        debug!("Link state: {} -> {}", prev.name(), next.name());
        self.state_tx.send_replace(next);
        self.sink.publish_connectivity(next);
    }
}
