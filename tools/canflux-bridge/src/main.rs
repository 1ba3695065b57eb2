// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! canflux-bridge CLI
//!
//! Stream CAN frames from an SLCAN adapter into InfluxDB.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, token from the environment
//! INFLUXDB3_AUTH_TOKEN=... canflux-bridge --port /dev/ttyUSB0
//!
//! # YAML config with overrides
//! canflux-bridge --config bridge.yaml --car-id sunstang25 --telem-id 0x6B1
//!
//! # Print Line Protocol instead of writing it
//! canflux-bridge --port COM6 --dry-run
//! ```

use anyhow::{Context, Result};
use canflux::config::parse_int_auto;
use canflux::{
    Bridge, BridgeConfig, InfluxSink, LineSink, SlcanSource, StdoutSink, StopHandle,
    WriteFailurePolicy,
};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "canflux-bridge")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream CAN bus telemetry from an SLCAN adapter into InfluxDB")]
#[command(long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the adapter (e.g., COM6, /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud between host and adapter
    #[arg(long)]
    baud: Option<u32>,

    /// CAN bus bitrate in bit/s
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// InfluxDB URL
    #[arg(long)]
    host: Option<String>,

    /// InfluxDB database
    #[arg(short, long)]
    database: Option<String>,

    /// car_id tag on every point
    #[arg(long)]
    car_id: Option<String>,

    /// Telemetry arbitration id (decimal, 0x, 0o or 0b)
    #[arg(long, value_parser = parse_can_id)]
    telem_id: Option<u32>,

    /// Telemetry id is a 29-bit extended id
    #[arg(long)]
    telem_extended: bool,

    /// Do not store raw frames
    #[arg(long)]
    no_raw: bool,

    /// Do not decode telemetry
    #[arg(long)]
    no_decode: bool,

    /// Lines per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum milliseconds between flushes
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Log failed writes and keep running
    #[arg(long)]
    continue_on_write_error: bool,

    /// Print Line Protocol to stdout instead of writing to InfluxDB
    #[arg(long)]
    dry_run: bool,

    /// Verbose mode (show debug logs)
    #[arg(short, long)]
    verbose: bool,
}

fn parse_can_id(s: &str) -> std::result::Result<u32, String> {
    parse_int_auto(s).ok_or_else(|| format!("invalid CAN id: {}", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("canflux=debug,canflux_bridge=debug")
        } else {
            EnvFilter::new("canflux=info,canflux_bridge=info")
        }
    });
    fmt().with_env_filter(filter).with_target(false).init();

    let config = build_config(&cli)?;

    let sink: Box<dyn LineSink> = if cli.dry_run {
        Box::new(StdoutSink)
    } else {
        let token = config
            .token()
            .context("Set INFLUXDB3_AUTH_TOKEN or influxdb.token in the config file")?;
        let sink = InfluxSink::connect(&config.influxdb.host, &config.influxdb.database, token)
            .context("Failed to create InfluxDB client")?;
        tracing::info!("[OK] Influx target: {}", sink.write_url());
        Box::new(sink)
    };

    let channel = config.channel();
    let source = SlcanSource::open(&channel, config.serial.bitrate)
        .with_context(|| format!("Failed to open CAN adapter on {}", channel))?;
    tracing::info!(
        "[OK] CAN connected: channel={} bitrate={}",
        channel,
        config.serial.bitrate
    );
    tracing::info!(
        "[INFO] RAW logging: {}",
        if config.write_raw_frames { "ON" } else { "OFF" }
    );
    if config.decode_telemetry {
        tracing::info!(
            "[INFO] TELEM decode: ID=0x{:X} EXT={}",
            config.telemetry.can_id,
            config.telemetry.extended
        );
    } else {
        tracing::info!("[INFO] TELEM decode: OFF");
    }

    let mut bridge = Bridge::new(&config, source, sink);

    let stop_handle = StopHandle::new();
    ctrlc_handler(stop_handle.clone());

    let stats = bridge.run(&stop_handle).context("Bridge error")?;
    tracing::info!(
        frames = stats.frames_received,
        raw_points = stats.raw_points,
        telemetry_points = stats.telemetry_points,
        points_written = stats.points_written,
        write_failures = stats.write_failures,
        "Bridge shutdown complete"
    );

    Ok(())
}

fn build_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match cli.config {
        Some(ref path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    config.apply_env().context("Invalid environment override")?;
    apply_cli(&mut config, cli);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_cli(config: &mut BridgeConfig, cli: &Cli) {
    if let Some(ref port) = cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }
    if let Some(bitrate) = cli.bitrate {
        config.serial.bitrate = bitrate;
    }
    if let Some(ref host) = cli.host {
        config.influxdb.host = host.clone();
    }
    if let Some(ref database) = cli.database {
        config.influxdb.database = database.clone();
    }
    if let Some(ref car_id) = cli.car_id {
        config.car_id = car_id.clone();
    }
    if let Some(id) = cli.telem_id {
        config.telemetry.can_id = id;
    }
    if cli.telem_extended {
        config.telemetry.extended = true;
    }
    if cli.no_raw {
        config.write_raw_frames = false;
    }
    if cli.no_decode {
        config.decode_telemetry = false;
    }
    if let Some(size) = cli.batch_size {
        config.batch.max_size = size;
    }
    if let Some(ms) = cli.flush_interval_ms {
        config.batch.flush_interval_ms = ms;
    }
    if cli.continue_on_write_error {
        config.on_write_error = WriteFailurePolicy::LogAndContinue;
    }
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    });
}
