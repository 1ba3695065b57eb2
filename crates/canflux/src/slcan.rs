// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SLCAN (Lawicel ASCII) serial adapter source.
//!
//! Records are `\r`-terminated ASCII:
//!
//! | Record | Meaning |
//! |--------|---------|
//! | `tIIILDD..` | standard data frame, 3 hex id digits, DLC, 2 hex digits per byte |
//! | `TIIIIIIIILDD..` | extended data frame, 8 hex id digits |
//! | `rIIIL` / `RIIIIIIIIL` | remote frames |
//! | `\x07` | adapter error reply, sent without `\r` |
//! | `z` / `Z` | transmit acknowledgements |
//!
//! Adapters with timestamps enabled append 4 hex digits to frame records;
//! those are accepted and ignored.

use crate::error::{Error, Result};
use crate::frame::{max_id, CanFrame, MAX_DATA_LEN};
use crate::source::{ChannelSpec, FrameSource};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

const CR: u8 = b'\r';
const BELL: u8 = 0x07;

/// Length of the optional timestamp suffix.
const TIMESTAMP_DIGITS: usize = 4;

/// Longest valid record without its terminator: `T`, 8 id digits, DLC,
/// 16 data digits, timestamp.
const MAX_RECORD_LEN: usize = 1 + 8 + 1 + 2 * MAX_DATA_LEN + TIMESTAMP_DIGITS;

/// Initial serial read timeout; replaced on every receive.
const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// Byte stream to an SLCAN adapter.
pub trait SerialLink: Read + Write {
    /// Set how long a single `read` may block.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }
}

/// SLCAN setup command for a CAN bitrate (`S0`..`S8`).
pub fn bitrate_command(bitrate: u32) -> Result<&'static str> {
    let cmd = match bitrate {
        10_000 => "S0",
        20_000 => "S1",
        50_000 => "S2",
        100_000 => "S3",
        125_000 => "S4",
        250_000 => "S5",
        500_000 => "S6",
        800_000 => "S7",
        1_000_000 => "S8",
        other => return Err(Error::UnsupportedBitrate(other)),
    };
    Ok(cmd)
}

/// Frame source reading from an SLCAN adapter.
pub struct SlcanSource<L: SerialLink> {
    link: L,
    pending: Vec<u8>,
    /// Dropping bytes until the next terminator after an overlong record.
    discarding: bool,
    open: bool,
}

fn is_terminator(b: u8) -> bool {
    b == CR || b == BELL
}

impl SlcanSource<Box<dyn SerialPort>> {
    /// Open the serial port and start the bus at `bitrate`.
    pub fn open(channel: &ChannelSpec, bitrate: u32) -> Result<Self> {
        // Reject the bitrate before touching the port.
        bitrate_command(bitrate)?;
        let port = serialport::new(channel.port.as_str(), channel.baud)
            .timeout(OPEN_TIMEOUT)
            .open()?;
        Self::start(port, bitrate)
    }
}

impl<L: SerialLink> SlcanSource<L> {
    /// Configure and open the bus on an already-open link.
    ///
    /// Sends close, bitrate, open. Replies (`\r` or BELL) are consumed as
    /// ordinary records by later receives.
    pub fn start(mut link: L, bitrate: u32) -> Result<Self> {
        let setup = bitrate_command(bitrate)?;
        link.write_all(b"C\r")?;
        link.write_all(setup.as_bytes())?;
        link.write_all(b"\r")?;
        link.write_all(b"O\r")?;
        link.flush()?;

        tracing::debug!(bitrate, setup, "SLCAN channel opened");

        Ok(Self {
            link,
            pending: Vec::with_capacity(64),
            discarding: false,
            open: true,
        })
    }

    /// Close the CAN channel. The serial link stays open.
    pub fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.link.write_all(b"C\r")?;
            self.link.flush()?;
        }
        Ok(())
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Pop the next complete record from the pending bytes.
    ///
    /// A record ends at `\r` (dropped) or BELL (kept, so a bare error
    /// reply comes out as `[BELL]`).
    fn next_record(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| is_terminator(b))?;
        let mut record: Vec<u8> = self.pending.drain(..=end).collect();
        if record.last() == Some(&CR) {
            record.pop();
        }
        Some(record)
    }

    /// Append bytes read from the link, honoring an active discard.
    fn accept(&mut self, mut bytes: &[u8]) {
        if self.discarding {
            let Some(end) = bytes.iter().position(|&b| is_terminator(b)) else {
                return;
            };
            self.discarding = false;
            bytes = &bytes[end + 1..];
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Drop an unterminated record that is already longer than any valid one.
    fn discard_overlong(&mut self) {
        if self.pending.len() > MAX_RECORD_LEN {
            tracing::warn!(
                bytes = self.pending.len(),
                "Discarding unterminated SLCAN input"
            );
            self.pending.clear();
            self.discarding = true;
        }
    }

    /// Return the first frame among complete pending records.
    fn drain_pending(&mut self) -> Option<CanFrame> {
        while let Some(record) = self.next_record() {
            match parse_record(&record) {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping SLCAN record: {}", e),
            }
        }
        None
    }
}

impl<L: SerialLink> FrameSource for SlcanSource<L> {
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(frame) = self.drain_pending() {
                return Ok(Some(frame));
            }
            self.discard_overlong();

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.link.set_read_timeout(deadline - now)?;

            match self.link.read(&mut buf) {
                Ok(0) => return Err(Error::Io(io::ErrorKind::UnexpectedEof.into())),
                Ok(n) => self.accept(&buf[..n]),
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
                {
                    return Ok(None);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<L: SerialLink> Drop for SlcanSource<L> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("SLCAN close on drop failed: {}", e);
        }
    }
}

/// Parse one SLCAN record (without its trailing `\r`).
///
/// Returns `Ok(None)` for records that are not frames (acks, error
/// replies, version strings).
pub fn parse_record(record: &[u8]) -> Result<Option<CanFrame>> {
    let Some((&kind, body)) = record.split_first() else {
        return Ok(None);
    };

    let (id_digits, extended, remote) = match kind {
        b't' => (3, false, false),
        b'T' => (8, true, false),
        b'r' => (3, false, true),
        b'R' => (8, true, true),
        BELL => {
            tracing::debug!("Adapter replied with error (BELL)");
            return Ok(None);
        }
        _ => return Ok(None),
    };

    let malformed = |reason: &'static str| Error::Slcan {
        record: String::from_utf8_lossy(record).into_owned(),
        reason,
    };

    if !body.is_ascii() {
        return Err(malformed("not ASCII"));
    }
    let text = std::str::from_utf8(body).map_err(|_| malformed("not ASCII"))?;
    if text.len() < id_digits + 1 {
        return Err(malformed("record too short"));
    }

    let id_text = &text[..id_digits];
    if !id_text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed("bad id"));
    }
    let id = u32::from_str_radix(id_text, 16).map_err(|_| malformed("bad id"))?;
    if id > max_id(extended) {
        return Err(malformed("id out of range"));
    }

    let dlc_text = &text[id_digits..=id_digits];
    if !dlc_text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed("bad dlc"));
    }
    let dlc = u8::from_str_radix(dlc_text, 16).map_err(|_| malformed("bad dlc"))?;
    if dlc as usize > MAX_DATA_LEN {
        return Err(malformed("dlc above 8"));
    }

    let rest = &text[id_digits + 1..];
    let data_digits = if remote { 0 } else { dlc as usize * 2 };
    if rest.len() != data_digits && rest.len() != data_digits + TIMESTAMP_DIGITS {
        return Err(malformed("length does not match dlc"));
    }

    let frame = if remote {
        CanFrame::new_remote_frame(id, extended, dlc)
    } else {
        let data = hex::decode(&rest[..data_digits]).map_err(|_| malformed("bad data"))?;
        CanFrame::new_data(id, extended, &data)
    };
    frame.map(Some).ok_or_else(|| malformed("invalid frame"))
}
