// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upstream frame sources.
//!
//! # Source Trait
//!
//! ```ignore
//! pub trait FrameSource {
//!     fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>>;
//! }
//! ```
//!
//! # Implementations
//!
//! - [`SlcanSource`](crate::slcan::SlcanSource) - SLCAN/Lawicel serial adapter

use crate::error::{Error, Result};
use crate::frame::CanFrame;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Serial baud used when the channel string omits one.
pub const DEFAULT_SERIAL_BAUD: u32 = 115_200;

/// Something that yields CAN frames.
pub trait FrameSource {
    /// Block until the next frame arrives or `timeout` elapses.
    ///
    /// # Returns
    /// * `Ok(Some(frame))` when a frame arrived
    /// * `Ok(None)` on timeout
    /// * `Err` when the adapter failed; callers treat this as fatal
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>> {
        (**self).receive(timeout)
    }
}

/// Serial side of an adapter channel: `<port>@<baud>`, e.g. `COM6@115200`.
///
/// The baud here is the host-to-adapter link speed, not the CAN bitrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Serial port name (`COM6`, `/dev/ttyUSB0`).
    pub port: String,
    /// Serial baud rate.
    pub baud: u32,
}

impl ChannelSpec {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
        }
    }

    /// Parse `<port>[@<baud>]`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (port, baud) = match s.rsplit_once('@') {
            Some((port, baud)) => {
                let baud = baud
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidChannel(s.to_string()))?;
                (port, baud)
            }
            None => (s, DEFAULT_SERIAL_BAUD),
        };
        if port.is_empty() || baud == 0 {
            return Err(Error::InvalidChannel(s.to_string()));
        }
        Ok(Self::new(port, baud))
    }
}

impl FromStr for ChannelSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port, self.baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_with_baud() {
        let ch = ChannelSpec::parse("COM6@115200").expect("parse");
        assert_eq!(ch.port, "COM6");
        assert_eq!(ch.baud, 115_200);
        assert_eq!(ch.to_string(), "COM6@115200");
    }

    #[test]
    fn test_channel_parse_default_baud() {
        let ch: ChannelSpec = "/dev/ttyUSB0".parse().expect("parse");
        assert_eq!(ch, ChannelSpec::new("/dev/ttyUSB0", DEFAULT_SERIAL_BAUD));
    }

    #[test]
    fn test_channel_parse_rejects_garbage() {
        assert!(matches!(ChannelSpec::parse("COM6@fast"), Err(Error::InvalidChannel(_))));
        assert!(matches!(ChannelSpec::parse("@115200"), Err(Error::InvalidChannel(_))));
        assert!(matches!(ChannelSpec::parse("COM6@0"), Err(Error::InvalidChannel(_))));
        assert!(matches!(ChannelSpec::parse(""), Err(Error::InvalidChannel(_))));
    }
}
