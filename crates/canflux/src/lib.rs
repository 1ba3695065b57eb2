// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! canflux: CAN bus to InfluxDB telemetry bridge.
//!
//! Reads frames from an SLCAN serial adapter, optionally decodes one
//! custom BMS telemetry message into engineering units, and writes both
//! raw and decoded points to InfluxDB in batched Line Protocol.
//!
//! This crate provides:
//! - SLCAN/Lawicel frame source over `serialport`
//! - Fixed-layout decoding of the 8-byte BMS telemetry message
//! - InfluxDB Line Protocol generation
//! - Batching with size and time-based flushing
//! - A blocking HTTP sink for InfluxDB
//! - YAML + environment configuration
//!
//! # Overview
//!
//! ```text
//! SlcanSource --> CanFrame --> decode / encode --> BatchWriter --> LineSink
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use canflux::{Bridge, BridgeConfig, InfluxSink, SlcanSource, StopHandle};
//!
//! let mut config = BridgeConfig::default();
//! config.apply_env()?;
//! config.validate()?;
//!
//! let source = SlcanSource::open(&config.channel(), config.serial.bitrate)?;
//! let influx = &config.influxdb;
//! let sink = InfluxSink::connect(&influx.host, &influx.database, config.token()?)?;
//!
//! let stop = StopHandle::new();
//! Bridge::new(&config, source, sink).run(&stop)?;
//! ```

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod influx;
pub mod sink;
pub mod slcan;
pub mod source;

pub use bridge::{Bridge, BridgeStats, StepOutcome, StopHandle};
pub use buffer::BatchWriter;
pub use config::{BridgeConfig, WriteFailurePolicy};
pub use decoder::{decode, TelemetryRecord};
pub use encoder::{encode_raw, encode_telemetry, PointTags};
pub use error::{Error, Result};
pub use frame::CanFrame;
pub use influx::FieldValue;
pub use sink::{InfluxSink, LineSink, MemorySink, StdoutSink};
pub use slcan::SlcanSource;
pub use source::{ChannelSpec, FrameSource};
