// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Classic CAN frame as received from the adapter.

use embedded_can::{ExtendedId, Id, StandardId};

/// Maximum payload of a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

/// A classic CAN frame (up to 8 data bytes).
///
/// Frames are immutable once received. Remote frames carry a DLC but no
/// payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    arbitration_id: u32,
    is_extended: bool,
    is_remote: bool,
    dlc: u8,
    data: [u8; MAX_DATA_LEN],
}

impl CanFrame {
    /// Build a data frame. Returns `None` if `data` is longer than 8 bytes
    /// or the id does not fit its addressing mode.
    pub fn new_data(arbitration_id: u32, is_extended: bool, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DATA_LEN || !id_in_range(arbitration_id, is_extended) {
            return None;
        }
        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            arbitration_id,
            is_extended,
            is_remote: false,
            dlc: data.len() as u8,
            data: buf,
        })
    }

    /// Build a remote (RTR) frame requesting `dlc` bytes.
    pub fn new_remote_frame(arbitration_id: u32, is_extended: bool, dlc: u8) -> Option<Self> {
        if dlc as usize > MAX_DATA_LEN || !id_in_range(arbitration_id, is_extended) {
            return None;
        }
        Some(Self {
            arbitration_id,
            is_extended,
            is_remote: true,
            dlc,
            data: [0u8; MAX_DATA_LEN],
        })
    }

    /// Raw 11-bit or 29-bit identifier.
    pub fn arbitration_id(&self) -> u32 {
        self.arbitration_id
    }

    /// Whether the frame uses 29-bit addressing.
    pub fn is_extended(&self) -> bool {
        self.is_extended
    }

    /// Whether this is a remote transmission request.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Data length code (0..=8).
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Payload bytes. Empty for remote frames.
    pub fn payload(&self) -> &[u8] {
        if self.is_remote {
            &[]
        } else {
            &self.data[..self.dlc as usize]
        }
    }

    /// Whether this frame carries the given identity.
    pub fn matches(&self, arbitration_id: u32, is_extended: bool) -> bool {
        self.arbitration_id == arbitration_id && self.is_extended == is_extended
    }

    /// Copy any embedded-can frame into a `CanFrame`.
    pub fn from_frame<F: embedded_can::Frame>(frame: &F) -> Option<Self> {
        let (raw, extended) = match frame.id() {
            Id::Standard(id) => (id.as_raw() as u32, false),
            Id::Extended(id) => (id.as_raw(), true),
        };
        if frame.is_remote_frame() {
            Self::new_remote_frame(raw, extended, frame.dlc() as u8)
        } else {
            Self::new_data(raw, extended, frame.data())
        }
    }
}

/// Largest valid identifier for the addressing mode.
pub fn max_id(is_extended: bool) -> u32 {
    if is_extended {
        ExtendedId::MAX.as_raw()
    } else {
        StandardId::MAX.as_raw() as u32
    }
}

fn id_in_range(arbitration_id: u32, is_extended: bool) -> bool {
    arbitration_id <= max_id(is_extended)
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Self::new_data(id.as_raw() as u32, false, data),
            Id::Extended(id) => Self::new_data(id.as_raw(), true, data),
        }
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        let dlc = u8::try_from(dlc).ok()?;
        match id.into() {
            Id::Standard(id) => Self::new_remote_frame(id.as_raw() as u32, false, dlc),
            Id::Extended(id) => Self::new_remote_frame(id.as_raw(), true, dlc),
        }
    }

    fn is_extended(&self) -> bool {
        self.is_extended
    }

    fn is_remote_frame(&self) -> bool {
        self.is_remote
    }

    fn id(&self) -> Id {
        if self.is_extended {
            // Range checked at construction.
            ExtendedId::new(self.arbitration_id)
                .map(Id::Extended)
                .unwrap_or(Id::Extended(ExtendedId::ZERO))
        } else {
            StandardId::new(self.arbitration_id as u16)
                .map(Id::Standard)
                .unwrap_or(Id::Standard(StandardId::ZERO))
        }
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::Frame;

    #[test]
    fn test_data_frame_accessors() {
        let frame = CanFrame::new_data(0x6B0, false, &[1, 2, 3]).expect("frame");
        assert_eq!(frame.arbitration_id(), 0x6B0);
        assert!(!frame.is_extended());
        assert!(!frame.is_remote());
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert!(frame.matches(0x6B0, false));
        assert!(!frame.matches(0x6B0, true));
    }

    #[test]
    fn test_rejects_oversized_payload_and_id() {
        assert!(CanFrame::new_data(0x100, false, &[0; 9]).is_none());
        assert!(CanFrame::new_data(0x800, false, &[]).is_none());
        assert!(CanFrame::new_data(0x800, true, &[]).is_some());
        assert!(CanFrame::new_data(0x2000_0000, true, &[]).is_none());
    }

    #[test]
    fn test_remote_frame_has_no_payload() {
        let frame = CanFrame::new_remote_frame(0x123, false, 4).expect("frame");
        assert!(frame.is_remote());
        assert_eq!(frame.dlc(), 4);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_embedded_can_roundtrip() {
        let id = ExtendedId::new(0x18FF_50E5).expect("id");
        let frame = <CanFrame as Frame>::new(id, &[0xAA, 0xBB]).expect("frame");
        assert!(Frame::is_extended(&frame));
        assert_eq!(frame.id(), Id::Extended(id));

        let copy = CanFrame::from_frame(&frame).expect("copy");
        assert_eq!(copy, frame);
        assert_eq!(copy.arbitration_id(), 0x18FF_50E5);
    }
}
