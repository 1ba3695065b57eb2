// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw-frame and telemetry points.
//!
//! ```text
//! bms_can_raw,car_id=sunstang24,source=candapter arb_id=1712i,is_ext=0i,dlc=8i,data_hex="e803..." 1700000000000000000
//! bms_telemetry,car_id=sunstang24,source=candapter_decoded pack_voltage=100.0,...,fault_text="OK" 1700000000000000000
//! ```

use crate::decoder::TelemetryRecord;
use crate::error::Result;
use crate::frame::CanFrame;
use crate::influx::{format_line, FieldValue};

/// Default `source` tag on raw-frame points.
pub const DEFAULT_RAW_SOURCE: &str = "candapter";

/// Default `source` tag on telemetry points.
pub const DEFAULT_TELEMETRY_SOURCE: &str = "candapter_decoded";

/// The fixed tag set carried by every point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointTags {
    /// Car or session identifier.
    pub car_id: String,
    /// Origin of the point (adapter, decoder...).
    pub source: String,
}

impl PointTags {
    pub fn new(car_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            car_id: car_id.into(),
            source: source.into(),
        }
    }

    fn as_pairs(&self) -> [(&str, &str); 2] {
        [("car_id", self.car_id.as_str()), ("source", self.source.as_str())]
    }
}

/// Encode a raw CAN frame.
///
/// Fields: `arb_id`, `is_ext` (0/1), `dlc`, `data_hex` (lowercase).
pub fn encode_raw(
    frame: &CanFrame,
    tags: &PointTags,
    measurement: &str,
    timestamp_ns: u64,
) -> Result<String> {
    let fields = [
        ("arb_id", FieldValue::Integer(i64::from(frame.arbitration_id()))),
        ("is_ext", FieldValue::Integer(i64::from(frame.is_extended()))),
        ("dlc", FieldValue::Integer(i64::from(frame.dlc()))),
        ("data_hex", FieldValue::String(hex::encode(frame.payload()))),
    ];
    format_line(measurement, &tags.as_pairs(), &fields, timestamp_ns)
}

/// Encode a decoded telemetry record.
///
/// Float fields are written as decimals, `fault_flag` as an integer, plus
/// a `fault_text` string field.
pub fn encode_telemetry(
    record: &TelemetryRecord,
    tags: &PointTags,
    measurement: &str,
    timestamp_ns: u64,
) -> Result<String> {
    let fields = [
        ("pack_voltage", FieldValue::Float(record.pack_voltage)),
        ("pack_current", FieldValue::Float(record.pack_current)),
        ("soc", FieldValue::Float(record.soc)),
        ("avg_temp", FieldValue::Float(record.avg_temp)),
        ("max_temp", FieldValue::Float(record.max_temp)),
        ("fault_flag", FieldValue::Integer(i64::from(record.fault_flag))),
        ("fault_text", FieldValue::String(record.fault_text())),
    ];
    format_line(measurement, &tags.as_pairs(), &fields, timestamp_ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    const EXAMPLE: [u8; 8] = [0xE8, 0x03, 0x64, 0x00, 0xC8, 0x19, 0x1E, 0x00];

    fn raw_tags() -> PointTags {
        PointTags::new("sunstang24", DEFAULT_RAW_SOURCE)
    }

    fn telem_tags() -> PointTags {
        PointTags::new("sunstang24", DEFAULT_TELEMETRY_SOURCE)
    }

    #[test]
    fn test_encode_raw_standard_frame() {
        let frame = CanFrame::new_data(0x123, false, &[0x00, 0x11, 0x22, 0xAB]).expect("frame");
        let line = encode_raw(&frame, &raw_tags(), "bms_can_raw", 1234567890).expect("encode");
        assert_eq!(
            line,
            "bms_can_raw,car_id=sunstang24,source=candapter \
             arb_id=291i,is_ext=0i,dlc=4i,data_hex=\"001122ab\" 1234567890"
        );
    }

    #[test]
    fn test_encode_raw_extended_empty_payload() {
        let frame = CanFrame::new_data(0x18FF_50E5, true, &[]).expect("frame");
        let line = encode_raw(&frame, &raw_tags(), "bms_can_raw", 7).expect("encode");
        assert_eq!(
            line,
            "bms_can_raw,car_id=sunstang24,source=candapter \
             arb_id=419385573i,is_ext=1i,dlc=0i,data_hex=\"\" 7"
        );
    }

    #[test]
    fn test_encode_raw_data_hex_is_plain_hex() {
        let payload = [0x22, 0x5C, 0xFF];
        let frame = CanFrame::new_data(0x100, false, &payload).expect("frame");
        let line = encode_raw(&frame, &raw_tags(), "bms_can_raw", 5).expect("encode");
        let expected = format!("data_hex=\"{}\" 5", hex::encode(payload));
        assert!(line.ends_with(&expected), "{}", line);
    }

    #[test]
    fn test_encode_telemetry_example() {
        let record = decode(&EXAMPLE).expect("decode");
        let line = encode_telemetry(&record, &telem_tags(), "bms_telemetry", 42).expect("encode");
        assert_eq!(
            line,
            "bms_telemetry,car_id=sunstang24,source=candapter_decoded \
             pack_voltage=100.0,pack_current=10.0,soc=100.0,avg_temp=25.0,max_temp=30.0,\
             fault_flag=0i,fault_text=\"OK\" 42"
        );
    }

    #[test]
    fn test_encode_telemetry_fault() {
        let mut payload = EXAMPLE;
        payload[7] = 0x0A;
        let record = decode(&payload).expect("decode");
        let line = encode_telemetry(&record, &telem_tags(), "bms_telemetry", 1).expect("encode");
        assert!(line.contains("fault_flag=10i,fault_text=\"0x0A\""));
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let record = decode(&EXAMPLE).expect("decode");
        let a = encode_telemetry(&record, &telem_tags(), "bms_telemetry", 99).expect("encode");
        let b = encode_telemetry(&record, &telem_tags(), "bms_telemetry", 99).expect("encode");
        assert_eq!(a.as_bytes(), b.as_bytes());

        let frame = CanFrame::new_data(0x6B0, false, &EXAMPLE).expect("frame");
        let a = encode_raw(&frame, &raw_tags(), "bms_can_raw", 99).expect("encode");
        let b = encode_raw(&frame, &raw_tags(), "bms_can_raw", 99).expect("encode");
        assert_eq!(a, b);
    }
}
