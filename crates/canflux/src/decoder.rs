// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoder for the custom 8-byte BMS telemetry message.
//!
//! Payload layout (little-endian):
//! ```text
//! bytes 0-1  pack_voltage  u16  0.1 V
//! bytes 2-3  pack_current  i16  0.1 A
//! byte  4    soc           u8   0.5 %
//! byte  5    avg_temp      u8   degC
//! byte  6    max_temp      u8   degC
//! byte  7    fault_flag    u8   0 = OK, otherwise bitfield
//! ```

/// Length of the telemetry payload.
pub const TELEMETRY_PAYLOAD_LEN: usize = 8;

/// Telemetry decoded into engineering units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    /// Pack voltage in volts.
    pub pack_voltage: f64,
    /// Pack current in amps (negative while charging).
    pub pack_current: f64,
    /// State of charge in percent.
    pub soc: f64,
    /// Average cell temperature in degC.
    pub avg_temp: f64,
    /// Maximum cell temperature in degC.
    pub max_temp: f64,
    /// Raw fault flag byte.
    pub fault_flag: u8,
}

impl TelemetryRecord {
    /// `"OK"` when no fault is set, otherwise the flag as `0xNN`.
    pub fn fault_text(&self) -> String {
        if self.fault_flag == 0 {
            "OK".to_string()
        } else {
            format!("0x{:02X}", self.fault_flag)
        }
    }
}

/// Decode a telemetry payload.
///
/// Returns `None` when fewer than 8 bytes are present. Bytes past the
/// eighth are ignored. There is no checksum, so any 8 bytes decode.
pub fn decode(payload: &[u8]) -> Option<TelemetryRecord> {
    let bytes: &[u8; TELEMETRY_PAYLOAD_LEN] =
        payload.get(..TELEMETRY_PAYLOAD_LEN)?.try_into().ok()?;

    let voltage_raw = u16::from_le_bytes([bytes[0], bytes[1]]);
    let current_raw = i16::from_le_bytes([bytes[2], bytes[3]]);

    Some(TelemetryRecord {
        pack_voltage: f64::from(voltage_raw) / 10.0,
        pack_current: f64::from(current_raw) / 10.0,
        soc: f64::from(bytes[4]) / 2.0,
        avg_temp: f64::from(bytes[5]),
        max_temp: f64::from(bytes[6]),
        fault_flag: bytes[7],
    })
}
