//! # StepTrack Binary
//!
//! Runs the tracker against a simulated or bridged actuator with console
//! and remote command sources.
//!
//! # Usage
//!
//! ```bash
//! # Simulated actuator, console input
//! steptrack --simulate
//!
//! # Serial-to-network bridge, remote clients on port 7070
//! steptrack --config steptrack.toml --connect 192.168.1.20:4000 --listen 0.0.0.0:7070
//!
//! # Verbose JSON logs, no console
//! steptrack -s -v --json --no-console
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use steptrack_common::config::{LogLevel, TrackerConfig};
use steptrack_common::consts::DEFAULT_CONFIG_PATH;
use steptrack_tracker::calibration::{CalibrationStore, FileCalibrationStore, MemoryCalibrationStore};
use steptrack_tracker::drivers::simulation::{SimulatedActuator, SimulationDriver};
use steptrack_tracker::drivers::tcp::TcpActuator;
use steptrack_tracker::sources;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// StepTrack - antenna bearing tracker
#[derive(Parser, Debug)]
#[command(name = "steptrack")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Bearing reconciliation and command dispatch for a stepper-driven antenna mount")]
#[command(long_about = None)]
struct Args {
    /// Path to tracker configuration (TOML).
    /// Falls back to /etc/steptrack/steptrack.toml, then built-in defaults.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run against the simulated actuator (default when --connect is absent)
    #[arg(short = 's', long, conflicts_with = "connect")]
    simulate: bool,

    /// Actuator line stream over TCP (serial-to-network bridge)
    #[arg(long, value_name = "HOST:PORT")]
    connect: Option<String>,

    /// Accept remote command clients on this address
    #[arg(long, value_name = "HOST:PORT")]
    listen: Option<String>,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            error!("StepTrack failed: {}", e);
            1
        }
    };
    // Exit here rather than on runtime drop, which would wait on the blocking stdin reader.
    std::process::exit(code);
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    let config = match &args.config {
        Some(path) => TrackerConfig::load_validated(path),
        None if default_path.exists() => TrackerConfig::load_validated(default_path),
        None => Ok(TrackerConfig::default()),
    };
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);
    let config = config?;

    info!(
        "{} v{} starting...",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let store: Arc<dyn CalibrationStore> = match &config.tracker.calibration_path {
        Some(path) => Arc::new(FileCalibrationStore::new(
            path,
            config.tracker.raw_counts_per_revolution,
        )),
        None => {
            warn!("No calibration_path configured; calibration is kept in memory only");
            Arc::new(MemoryCalibrationStore::new())
        }
    };

    let (handle, actor) = steptrack_tracker::spawn(config.clone(), store).await?;
    tokio::spawn(log_telemetry(handle.subscribe()));

    let driver = match &args.connect {
        Some(addr) => {
            info!("Actuator bridge: {}", addr);
            tokio::spawn(steptrack_tracker::drivers::run(
                TcpActuator::new(addr.clone()),
                handle.clone(),
            ))
        }
        None => {
            info!("Simulation mode enabled");
            let actuator = SimulatedActuator::from_config(&config.tracker);
            tokio::spawn(steptrack_tracker::drivers::run(
                SimulationDriver::new(actuator),
                handle.clone(),
            ))
        }
    };

    if let Some(addr) = &args.listen {
        let listener = TcpListener::bind(addr).await?;
        let remote = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = sources::run_remote(listener, remote).await {
                error!("Remote command source failed: {}", e);
            }
        });
    }

    if !args.no_console {
        tokio::spawn(sources::run_console(handle.clone()));
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
    handle.shutdown();

    let report = actor.await?;
    if let Err(e) = driver.await {
        warn!("Driver task ended abnormally: {}", e);
    }

    match report.final_record {
        Some(record) if report.saved => info!(
            "Calibration saved: raw={} bearing={:.2}",
            record.raw_sensor_value, record.bearing_at_that_raw
        ),
        Some(_) => warn!("Final calibration record could not be saved"),
        None => info!("No calibration to save"),
    }
    for axis in &report.bearings {
        info!("  - {}: {:.2} deg (unwrapped {:.2})", axis.name, axis.display, axis.absolute);
    }

    info!("StepTrack shutdown complete");
    Ok(())
}

/// Operator log of telemetry lines.
async fn log_telemetry(mut rx: broadcast::Receiver<steptrack_tracker::telemetry::TelemetryEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(target: "steptrack::telemetry", "{}", event.to_line()),
            Err(RecvError::Lagged(skipped)) => warn!("Telemetry log lagged by {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        log_level.as_directive().parse().unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
