// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Built once at startup and read-only afterwards. Layers, lowest first:
//! built-in defaults, an optional YAML file, environment variables, and
//! finally whatever the caller (the CLI) overrides.

use crate::buffer::{DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};
use crate::encoder::{PointTags, DEFAULT_RAW_SOURCE, DEFAULT_TELEMETRY_SOURCE};
use crate::error::{Error, Result};
use crate::frame::max_id;
use crate::source::{ChannelSpec, DEFAULT_SERIAL_BAUD};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the InfluxDB token.
pub const ENV_AUTH_TOKEN: &str = "INFLUXDB3_AUTH_TOKEN";
/// Environment variable overriding the telemetry CAN id.
pub const ENV_TELEM_CAN_ID: &str = "ORION_TELEM_CAN_ID";
/// Environment variable selecting an extended telemetry id.
pub const ENV_TELEM_IS_EXT: &str = "ORION_TELEM_IS_EXT";

/// Top-level bridge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial adapter settings.
    pub serial: SerialConfig,
    /// InfluxDB connection settings.
    pub influxdb: InfluxDbConfig,
    /// `car_id` tag on every point.
    pub car_id: String,
    /// Measurement for raw frames.
    pub raw_measurement: String,
    /// Measurement for decoded telemetry.
    pub telemetry_measurement: String,
    /// `source` tag on raw frames.
    pub raw_source: String,
    /// `source` tag on decoded telemetry.
    pub telemetry_source: String,
    /// Store every frame as a raw point.
    pub write_raw_frames: bool,
    /// Decode the telemetry message.
    pub decode_telemetry: bool,
    /// Identity of the telemetry message.
    pub telemetry: TelemetryConfig,
    /// Batching thresholds.
    pub batch: BatchConfig,
    /// How long one receive may block, in milliseconds.
    pub receive_timeout_ms: u64,
    /// What to do when a batch write fails.
    pub on_write_error: WriteFailurePolicy,
}

/// Serial adapter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port name (e.g., "COM6", "/dev/ttyUSB0").
    pub port: String,
    /// Host-to-adapter serial baud (not the CAN bitrate).
    pub baud: u32,
    /// CAN bus bitrate in bit/s.
    pub bitrate: u32,
}

/// InfluxDB connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxDbConfig {
    /// InfluxDB URL (e.g., "http://127.0.0.1:8181").
    pub host: String,
    /// Database (bucket) name.
    pub database: String,
    /// Authentication token. Usually supplied via `INFLUXDB3_AUTH_TOKEN`.
    pub token: Option<String>,
}

/// Which frame carries the telemetry payload.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Arbitration id. Accepts integers or strings such as `"0x6B0"`.
    #[serde(deserialize_with = "deserialize_can_id")]
    pub can_id: u32,
    /// Whether the id is 29-bit.
    pub extended: bool,
}

/// Batching thresholds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Lines per batch before a flush.
    pub max_size: usize,
    /// Maximum milliseconds between flushes.
    pub flush_interval_ms: u64,
}

/// Behavior when the store rejects or cannot receive a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteFailurePolicy {
    /// Stop the bridge with the error. Matches a plain fail-fast loop.
    #[default]
    Abort,
    /// Log, drop the batch, keep reading.
    LogAndContinue,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            influxdb: InfluxDbConfig::default(),
            car_id: "sunstang24".to_string(),
            raw_measurement: "bms_can_raw".to_string(),
            telemetry_measurement: "bms_telemetry".to_string(),
            raw_source: DEFAULT_RAW_SOURCE.to_string(),
            telemetry_source: DEFAULT_TELEMETRY_SOURCE.to_string(),
            write_raw_frames: true,
            decode_telemetry: true,
            telemetry: TelemetryConfig::default(),
            batch: BatchConfig::default(),
            receive_timeout_ms: 1000,
            on_write_error: WriteFailurePolicy::Abort,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM6".to_string(),
            baud: DEFAULT_SERIAL_BAUD,
            bitrate: 500_000,
        }
    }
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:8181".to_string(),
            database: "sunstang".to_string(),
            token: None,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            can_id: 0x6B0,
            extended: false,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
        }
    }
}

impl BridgeConfig {
    /// Parse configuration from a YAML string. Missing keys keep defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BridgeConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (keyed by variable name).
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `CANFLUX_SERIAL_PORT` | `serial.port` |
    /// | `CANFLUX_SERIAL_BAUD` | `serial.baud` |
    /// | `CANFLUX_CAN_BITRATE` | `serial.bitrate` |
    /// | `INFLUXDB3_HOST` | `influxdb.host` |
    /// | `INFLUXDB3_DATABASE` | `influxdb.database` |
    /// | `INFLUXDB3_AUTH_TOKEN` | `influxdb.token` |
    /// | `CANFLUX_CAR_ID` | `car_id` |
    /// | `ORION_TELEM_CAN_ID` | `telemetry.can_id` |
    /// | `ORION_TELEM_IS_EXT` | `telemetry.extended` |
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CANFLUX_SERIAL_PORT") {
            self.serial.port = v;
        }
        if let Some(v) = lookup("CANFLUX_SERIAL_BAUD") {
            self.serial.baud = parse_env_number("CANFLUX_SERIAL_BAUD", &v)?;
        }
        if let Some(v) = lookup("CANFLUX_CAN_BITRATE") {
            self.serial.bitrate = parse_env_number("CANFLUX_CAN_BITRATE", &v)?;
        }
        if let Some(v) = lookup("INFLUXDB3_HOST") {
            self.influxdb.host = v;
        }
        if let Some(v) = lookup("INFLUXDB3_DATABASE") {
            self.influxdb.database = v;
        }
        if let Some(v) = lookup(ENV_AUTH_TOKEN) {
            self.influxdb.token = Some(v);
        }
        if let Some(v) = lookup("CANFLUX_CAR_ID") {
            self.car_id = v;
        }
        if let Some(v) = lookup(ENV_TELEM_CAN_ID) {
            self.telemetry.can_id = parse_int_auto(&v).ok_or_else(|| {
                Error::InvalidConfig(format!("{}={:?} is not an integer", ENV_TELEM_CAN_ID, v))
            })?;
        }
        if let Some(v) = lookup(ENV_TELEM_IS_EXT) {
            self.telemetry.extended = parse_flag(&v);
        }
        Ok(())
    }

    /// Check value ranges. Does not require a token.
    pub fn validate(&self) -> Result<()> {
        if self.batch.max_size == 0 {
            return Err(Error::InvalidConfig("batch.max_size must be at least 1".to_string()));
        }
        if self.receive_timeout_ms == 0 {
            return Err(Error::InvalidConfig("receive_timeout_ms must be at least 1".to_string()));
        }
        if self.serial.port.trim().is_empty() {
            return Err(Error::InvalidConfig("serial.port is empty".to_string()));
        }
        let limit = max_id(self.telemetry.extended);
        if self.telemetry.can_id > limit {
            return Err(Error::InvalidConfig(format!(
                "telemetry.can_id 0x{:X} exceeds 0x{:X} for {} frames",
                self.telemetry.can_id,
                limit,
                if self.telemetry.extended { "extended" } else { "standard" }
            )));
        }
        Ok(())
    }

    /// The trimmed auth token, or [`Error::MissingToken`] if absent or blank.
    pub fn token(&self) -> Result<&str> {
        match self.influxdb.token.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Ok(t),
            _ => Err(Error::MissingToken),
        }
    }

    /// Serial channel for the adapter.
    pub fn channel(&self) -> ChannelSpec {
        ChannelSpec::new(self.serial.port.clone(), self.serial.baud)
    }

    /// Tags for raw-frame points.
    pub fn raw_tags(&self) -> PointTags {
        PointTags::new(self.car_id.clone(), self.raw_source.clone())
    }

    /// Tags for telemetry points.
    pub fn telemetry_tags(&self) -> PointTags {
        PointTags::new(self.car_id.clone(), self.telemetry_source.clone())
    }

    /// Maximum time between flushes.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.batch.flush_interval_ms)
    }

    /// Time one receive may block.
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Parse an integer with an optional `0x`, `0o` or `0b` prefix.
pub fn parse_int_auto(s: &str) -> Option<u32> {
    let s = s.trim().replace('_', "");
    let lower = s.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u32::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u32::from_str_radix(bin, 2).ok()
    } else {
        lower.parse().ok()
    }
}

/// `1`, `true`, `True`, `yes` and `YES` enable a flag; anything else disables it.
pub fn parse_flag(s: &str) -> bool {
    matches!(s, "1" | "true" | "True" | "yes" | "YES")
}

fn parse_env_number(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{}={:?} is not a number", key, value)))
}

fn deserialize_can_id<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u32),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => parse_int_auto(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid CAN id: {:?}", s))),
    }
}
