//! Daemon configuration
//!
//! One JSON file describes the whole deployment: which panel model the
//! link speaks, the serial parameters, framing heuristics, reconnection
//! backoff, queue persistence, and the relay/input pin assignments.
//! Every tunable with a sane default is optional in the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use facp_pipeline::{
    BackoffPolicy, BridgeConfig, HeartbeatTiming, LinkSettings, PipelineError, PulseSettings,
};
use facp_protocol::{AssemblerConfig, PanelModel, SeverityTable};
use serde::Deserialize;
use tokio_serial::{DataBits, Parity, StopBits};
use tracing::warn;

/// Top-level configuration file
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Numeric panel model identifier (10001..10004)
    pub panel_model_id: u32,
    /// Serial link parameters
    pub serial: SerialSection,
    /// Framing heuristics
    #[serde(default)]
    pub framing: FramingSection,
    /// Reconnection backoff
    #[serde(default)]
    pub reconnect: ReconnectSection,
    /// Queue persistence
    #[serde(default)]
    pub queue: QueueSection,
    /// Watchdog relay; omit to disable the heartbeat worker
    #[serde(default)]
    pub heartbeat_relay: Option<HeartbeatSection>,
    /// Alarm/trouble input sampling; omit to disable the monitor worker
    #[serde(default)]
    pub input_monitor: Option<InputMonitorSection>,
    /// Silence relay pulse
    pub silence_relay: RelaySection,
    /// Reset relay pulse
    pub reset_relay: RelaySection,
    /// Severity table file, JSON keyed by panel model id
    #[serde(default = "default_severity_table_path")]
    pub severity_table_path: PathBuf,
}

/// Serial link parameters
#[derive(Debug, Deserialize)]
pub struct SerialSection {
    /// Device path (e.g. `/dev/ttyUSB0`)
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// `"none"`, `"even"` or `"odd"`
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Framing heuristics
#[derive(Debug, Deserialize)]
pub struct FramingSection {
    /// Marker identifying report-delimiter lines
    #[serde(default)]
    pub report_delimiter: Option<String>,
    /// Delimiter count that completes a report
    #[serde(default)]
    pub max_report_delimiters: u32,
    /// Idle window before a stale buffer is force-flushed
    #[serde(default = "default_idle_flush_ms")]
    pub idle_flush_ms: u64,
}

impl Default for FramingSection {
    fn default() -> Self {
        Self {
            report_delimiter: None,
            max_report_delimiters: 0,
            idle_flush_ms: default_idle_flush_ms(),
        }
    }
}

/// Reconnection backoff
#[derive(Debug, Deserialize)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Queue persistence
#[derive(Debug, Deserialize)]
pub struct QueueSection {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

/// Watchdog relay timing
#[derive(Debug, Deserialize)]
pub struct HeartbeatSection {
    pub pin: u8,
    pub high_ms: u64,
    pub low_ms: u64,
}

/// Alarm/trouble input sampling
#[derive(Debug, Deserialize)]
pub struct InputMonitorSection {
    pub alarm_pin: u8,
    pub trouble_pin: u8,
    #[serde(default = "default_publish_interval_secs")]
    pub publish_interval_secs: u64,
    #[serde(default = "default_true")]
    pub alarm_active_high: bool,
    #[serde(default = "default_true")]
    pub trouble_active_high: bool,
}

/// One pulse relay
#[derive(Debug, Deserialize)]
pub struct RelaySection {
    pub pin: u8,
    pub activation_time_secs: u64,
    #[serde(default = "default_true")]
    pub active_high: bool,
}

fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_parity() -> String {
    "none".to_string()
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    500
}
fn default_idle_flush_ms() -> u64 {
    2000
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("queue_backup.json")
}
fn default_snapshot_interval_secs() -> u64 {
    30
}
fn default_publish_interval_secs() -> u64 {
    60
}
fn default_severity_table_path() -> PathBuf {
    PathBuf::from("event_severity.json")
}
fn default_true() -> bool {
    true
}

impl SerialSection {
    /// Map the textual serial parameters onto the link settings
    pub fn link_settings(&self) -> Result<LinkSettings> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => bail!("unsupported data bits: {other}"),
        };
        let parity = match self.parity.as_str() {
            "none" => Parity::None,
            "even" => Parity::Even,
            "odd" => Parity::Odd,
            other => bail!("unsupported parity: {other:?}"),
        };
        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => bail!("unsupported stop bits: {other}"),
        };
        Ok(LinkSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            data_bits,
            parity,
            stop_bits,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        })
    }
}

impl Config {
    /// Load and deserialize the configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// The configured panel model, or an error naming the bad identifier
    pub fn panel_model(&self) -> Result<PanelModel> {
        match PanelModel::from_id(self.panel_model_id) {
            Some(model) => Ok(model),
            None => Err(PipelineError::UnknownModel(self.panel_model_id).into()),
        }
    }

    /// Build the pipeline-side bridge configuration
    pub fn bridge_config(&self) -> Result<BridgeConfig> {
        Ok(BridgeConfig {
            link: self.serial.link_settings()?,
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.reconnect.base_delay_ms),
                max: Duration::from_millis(self.reconnect.max_delay_ms),
            },
            assembler: AssemblerConfig {
                report_delimiter: self.framing.report_delimiter.clone(),
                max_report_delimiters: self.framing.max_report_delimiters,
                idle_flush: Duration::from_millis(self.framing.idle_flush_ms),
            },
            snapshot_path: self.queue.snapshot_path.clone(),
            snapshot_interval: Duration::from_secs(self.queue.snapshot_interval_secs),
            heartbeat: self.heartbeat_relay.as_ref().map(|h| HeartbeatTiming {
                high_time: Duration::from_millis(h.high_ms),
                low_time: Duration::from_millis(h.low_ms),
            }),
            monitor_interval: Duration::from_secs(
                self.input_monitor
                    .as_ref()
                    .map(|m| m.publish_interval_secs)
                    .unwrap_or_else(default_publish_interval_secs),
            ),
            silence: PulseSettings {
                active_high: self.silence_relay.active_high,
                hold: Duration::from_secs(self.silence_relay.activation_time_secs),
            },
            reset: PulseSettings {
                active_high: self.reset_relay.active_high,
                hold: Duration::from_secs(self.reset_relay.activation_time_secs),
            },
        })
    }
}

/// Load the severity table for one panel model.
///
/// The file is a JSON object keyed by model id; a model missing from the
/// file yields an empty table (every event delivers with severity 0) and
/// a warning, not an error.
pub fn load_severity_table(path: &Path, model: PanelModel) -> Result<SeverityTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading severity table {}", path.display()))?;
    let mut by_model: HashMap<String, HashMap<String, i32>> = serde_json::from_str(&text)
        .with_context(|| format!("parsing severity table {}", path.display()))?;

    match by_model.remove(&model.id().to_string()) {
        Some(levels) => Ok(levels.into_iter().collect()),
        None => {
            warn!(
                "No severity entries for {} (id {}) in {}; all events will deliver with severity 0",
                model.name(),
                model.id(),
                path.display()
            );
            Ok(SeverityTable::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "panel_model_id": 10001,
        "serial": { "port": "/dev/ttyUSB0" },
        "silence_relay": { "pin": 17, "activation_time_secs": 5 },
        "reset_relay": { "pin": 27, "activation_time_secs": 3, "active_high": false }
    }"#;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config: Config = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.parity, "none");
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert_eq!(config.reconnect.max_delay_ms, 60_000);
        assert_eq!(config.queue.snapshot_path, PathBuf::from("queue_backup.json"));
        assert_eq!(config.framing.idle_flush_ms, 2000);
        assert!(config.heartbeat_relay.is_none());
        assert!(config.input_monitor.is_none());

        let bridge = config.bridge_config().unwrap();
        assert_eq!(bridge.silence.hold, Duration::from_secs(5));
        assert!(bridge.silence.active_high);
        assert!(!bridge.reset.active_high);
        assert!(bridge.heartbeat.is_none());
    }

    #[test]
    fn test_panel_model_resolution() {
        let config: Config = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(config.panel_model().unwrap(), PanelModel::EdwardsIo1000);
    }

    #[test]
    fn test_unknown_parity_is_rejected() {
        let section = SerialSection {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: "mark".to_string(),
            stop_bits: 1,
            read_timeout_ms: 500,
        };
        assert!(section.link_settings().is_err());
    }

    #[test]
    fn test_severity_table_loads_per_model() {
        let path = std::env::temp_dir().join(format!(
            "facp-severity-test-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{ "10001": { "HUMO ACT": 3 }, "10004": { "PERDIDA SUPERVISION": 2 } }"#,
        )
        .unwrap();

        let table = load_severity_table(&path, PanelModel::EdwardsIo1000).unwrap();
        assert_eq!(table.severity_of("HUMO ACT"), 3);
        assert_eq!(table.severity_of("PERDIDA SUPERVISION"), 0);

        let missing = load_severity_table(&path, PanelModel::NotifierNfs).unwrap();
        assert!(missing.is_empty());

        std::fs::remove_file(&path).unwrap();
    }
}
