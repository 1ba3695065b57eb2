// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by every stage of the bridge.

use thiserror::Error;

/// Errors produced by the bridge library.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening the serial port failed.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// YAML configuration could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The HTTP request to the time-series store failed in transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered the write with a non-success status.
    #[error("write rejected by store (HTTP {status}): {body}")]
    WriteRejected { status: u16, body: String },

    /// No auth token was configured.
    #[error("missing auth token: set INFLUXDB3_AUTH_TOKEN or influxdb.token")]
    MissingToken,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The serial channel string is not `<port>[@<baud>]`.
    #[error("invalid channel {0:?}: expected <port>[@<baud>]")]
    InvalidChannel(String),

    /// The adapter has no setup code for this bus bitrate.
    #[error("unsupported CAN bitrate: {0} bit/s")]
    UnsupportedBitrate(u32),

    /// The adapter sent a record that is not valid SLCAN.
    #[error("malformed SLCAN record {record:?}: {reason}")]
    Slcan {
        record: String,
        reason: &'static str,
    },

    /// A point was built without any field.
    #[error("point for measurement {0:?} has no fields")]
    EmptyFieldSet(String),
}

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
