// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Line Protocol formatting.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! Tags and fields are written in the order given. Exporters diff these
//! lines, so the output for a given input never changes.
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::error::{Error, Result};
use std::fmt;

/// A value that can be stored in an InfluxDB field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: always carries a decimal point (e.g., `100.0`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: double-quoted, see [`escape_string_field`]
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format_float(*v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => format!("\"{}\"", escape_string_field(v)),
            FieldValue::Boolean(v) => {
                if *v {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

/// Format a single point as one Line Protocol line (no trailing newline).
///
/// Returns [`Error::EmptyFieldSet`] if `fields` is empty, since InfluxDB
/// requires at least one field.
pub fn format_line(
    measurement: &str,
    tags: &[(&str, &str)],
    fields: &[(&str, FieldValue)],
    timestamp_ns: u64,
) -> Result<String> {
    if fields.is_empty() {
        return Err(Error::EmptyFieldSet(measurement.to_string()));
    }

    let mut line = escape_measurement(measurement);

    for (key, value) in tags {
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');

    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_line_protocol());
    }

    line.push(' ');
    line.push_str(&timestamp_ns.to_string());

    Ok(line)
}

/// Escape the contents of a string field value.
///
/// Backslashes are doubled first, then quotes are escaped, so the
/// backslash inserted before a quote is never escaped again.
pub fn escape_string_field(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Rust prints `100.0_f64` as `100`, which InfluxDB would read as an
/// integer-looking float. Keep a decimal point on whole numbers.
fn format_float(v: f64) -> String {
    let s = v.to_string();
    if v.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else {
        s
    }
}

/// Escape measurement name per Line Protocol spec.
/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys.
/// Commas, equals signs, and spaces must be escaped.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_float() {
        assert_eq!(FieldValue::Float(3.15).to_line_protocol(), "3.15");
        assert_eq!(FieldValue::Float(100.0).to_line_protocol(), "100.0");
        assert_eq!(FieldValue::Float(-0.5).to_line_protocol(), "-0.5");
        assert_eq!(FieldValue::Float(0.0).to_line_protocol(), "0.0");
    }

    #[test]
    fn test_field_value_integer() {
        assert_eq!(FieldValue::Integer(42).to_line_protocol(), "42i");
        assert_eq!(FieldValue::Integer(-7).to_line_protocol(), "-7i");
    }

    #[test]
    fn test_field_value_string() {
        let v = FieldValue::String("hello world".to_string());
        assert_eq!(v.to_line_protocol(), "\"hello world\"");
    }

    #[test]
    fn test_field_value_string_escaped_once() {
        let v = FieldValue::String(r#"a"b\c"#.to_string());
        assert_eq!(v.to_line_protocol(), r#""a\"b\\c""#);
    }

    #[test]
    fn test_field_value_boolean() {
        assert_eq!(FieldValue::Boolean(true).to_line_protocol(), "true");
        assert_eq!(FieldValue::Boolean(false).to_line_protocol(), "false");
    }

    #[test]
    fn test_escape_string_field_quotes_and_backslashes() {
        let escaped = escape_string_field(r#"a"b\c"#);
        assert_eq!(escaped, r#"a\"b\\c"#);

        // A backslash directly before a quote must not be double-escaped.
        assert_eq!(escape_string_field(r#"\""#), r#"\\\""#);
        assert_eq!(escape_string_field(r#"say "hi""#), r#"say \"hi\""#);
    }

    #[test]
    fn test_escape_string_field_identity_on_hex() {
        let hex = "e80364c8191e00ff";
        assert_eq!(escape_string_field(hex), hex);
    }

    #[test]
    fn test_line_simple_point() {
        let fields = [("value", FieldValue::Float(23.5))];
        let line = format_line("temperature", &[], &fields, 1_000_000_000).expect("format");
        assert_eq!(line, "temperature value=23.5 1000000000");
    }

    #[test]
    fn test_line_keeps_tag_and_field_order() {
        let line = format_line(
            "weather",
            &[("station", "north"), ("car_id", "c1")],
            &[
                ("temp", FieldValue::Float(22.1)),
                ("humidity", FieldValue::Integer(65)),
                ("ok", FieldValue::Boolean(true)),
            ],
            2_000_000_000,
        )
        .expect("format");
        assert_eq!(
            line,
            "weather,station=north,car_id=c1 temp=22.1,humidity=65i,ok=true 2000000000"
        );
    }

    #[test]
    fn test_line_escape_special_chars() {
        let line = format_line(
            "my measurement",
            &[("tag key", "tag,value")],
            &[("field=key", FieldValue::String("hello \"world\"".to_string()))],
            3_000_000_000,
        )
        .expect("format");
        assert_eq!(
            line,
            "my\\ measurement,tag\\ key=tag\\,value field\\=key=\"hello \\\"world\\\"\" 3000000000"
        );
    }

    #[test]
    fn test_line_requires_a_field() {
        let err = format_line("empty", &[("a", "b")], &[], 1).unwrap_err();
        assert!(matches!(err, Error::EmptyFieldSet(m) if m == "empty"));
    }
}
