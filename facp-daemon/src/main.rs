//! FACP Bridge Daemon
//!
//! Unattended bridge between a fire-alarm control panel's serial printer
//! port and a telemetry sink. Loads the deployment configuration, selects
//! the panel dialect, wires the delivery pipeline and runs until a signal
//! (or the death of the serial listener) shuts it down.

mod config;
mod sink;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use facp_pipeline::{
    Bridge, BridgeHardware, DigitalInput, DigitalOutput, EventSink, MonitoredInput,
    SimulatedInput, SimulatedOutput,
};
use facp_protocol::create_panel_parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{load_severity_table, Config};
use sink::TracingSink;

/// How long shutdown waits for the workers before reporting stragglers
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "facpd")]
#[command(about = "Bridge between a fire-alarm control panel and a telemetry sink")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "facpd=info,facp_protocol=info,facp_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting FACP bridge");

    // Startup resource failures fail fast, before any worker spawns
    let config = Config::load(&cli.config)?;
    let model = config.panel_model()?;
    let severity = load_severity_table(&config.severity_table_path, model)?;
    info!(
        "Panel model: {} ({} severity entries)",
        model.name(),
        severity.len()
    );

    log_available_ports(&config.serial.port);

    let parser = create_panel_parser(model, severity);
    let sink = Arc::new(TracingSink::new()) as Arc<dyn EventSink>;
    let hardware = build_hardware(&config);

    let mut bridge = Bridge::new(
        config.bridge_config()?,
        parser,
        sink,
        hardware,
    );
    bridge.start().await.context("starting bridge workers")?;

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = bridge.run() => info!("Bridge stopped"),
        _ = tokio::signal::ctrl_c() => info!("Interrupt received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    let outcomes = bridge.shutdown(SHUTDOWN_TIMEOUT).await;
    for (name, outcome) in outcomes {
        info!("Worker {}: {:?}", name, outcome);
    }
    Ok(())
}

/// Log the ports visible on this host; a typo'd device path is by far the
/// most common deployment failure.
fn log_available_ports(configured: &str) {
    match serialport::available_ports() {
        Ok(ports) => {
            let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
            info!("Serial ports on this host: {:?}", names);
            if !names.iter().any(|n| n == configured) {
                warn!(
                    "Configured port {} is not currently present; the listener will keep retrying",
                    configured
                );
            }
        }
        Err(e) => warn!("Could not enumerate serial ports: {}", e),
    }
}

/// Build the pin set.
///
/// This build has no hardware GPIO backend compiled in, so every pin is
/// simulated (transitions logged at debug level), mirroring how the
/// bridge behaves on a bench host. A hardware backend plugs in by
/// implementing `DigitalOutput`/`DigitalInput` over the real pins.
fn build_hardware(config: &Config) -> BridgeHardware {
    warn!("No GPIO backend available; relay and input pins are simulated");

    let silence_pin: Arc<dyn DigitalOutput> = Arc::new(SimulatedOutput::new(format!(
        "silence_relay(GPIO{})",
        config.silence_relay.pin
    )));
    let reset_pin: Arc<dyn DigitalOutput> = Arc::new(SimulatedOutput::new(format!(
        "reset_relay(GPIO{})",
        config.reset_relay.pin
    )));
    let heartbeat_pin: Option<Arc<dyn DigitalOutput>> =
        config.heartbeat_relay.as_ref().map(|h| {
            Arc::new(SimulatedOutput::new(format!("heartbeat_relay(GPIO{})", h.pin)))
                as Arc<dyn DigitalOutput>
        });

    let inputs = match &config.input_monitor {
        Some(monitor) => vec![
            (
                MonitoredInput {
                    name: "alarm".to_string(),
                    active_high: monitor.alarm_active_high,
                },
                Arc::new(SimulatedInput::new()) as Arc<dyn DigitalInput>,
            ),
            (
                MonitoredInput {
                    name: "trouble".to_string(),
                    active_high: monitor.trouble_active_high,
                },
                Arc::new(SimulatedInput::new()) as Arc<dyn DigitalInput>,
            ),
        ],
        None => Vec::new(),
    };

    BridgeHardware {
        silence_pin,
        reset_pin,
        heartbeat_pin,
        inputs,
    }
}
