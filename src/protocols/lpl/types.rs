use std::fmt;

use crate::error::{Error, Result};
use crate::protocols::apl::ControlCode;
use crate::protocols::crc::crc8;

/// Data bytes carried by every frame.
pub const FRAME_DATA_LEN: usize = 16;
/// Wire size of a frame: length byte, data, CRC-8.
pub const FRAME_LEN: usize = 1 + FRAME_DATA_LEN + 1;
/// Fill byte for unused data positions.
pub const PADDING: u8 = 0xFF;

const CRC_INDEX: usize = FRAME_LEN - 1;

/// Fixed-size link frame.
///
/// `data` is always padded to [`FRAME_DATA_LEN`] bytes. A frame built by the
/// host carries a freshly computed checksum; a frame decoded from the wire
/// carries the checksum it arrived with, so [`Frame::is_valid`] can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    length: u8,
    data: [u8; FRAME_DATA_LEN],
    crc: u8,
}

impl Frame {
    pub fn new(length: u8, payload: &[u8]) -> Result<Self> {
        if payload.len() > FRAME_DATA_LEN {
            return Err(Error::InvalidPayload(payload.len()));
        }

        let mut data = [PADDING; FRAME_DATA_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self::from_data(length, data))
    }

    /// Builds a frame from already padded data and computes its checksum.
    pub fn from_data(length: u8, data: [u8; FRAME_DATA_LEN]) -> Self {
        let crc = compute_crc(length, &data);
        Self { length, data, crc }
    }

    /// Frame carrying nothing but `byte` in its first data position.
    pub fn single_byte(byte: u8) -> Self {
        let mut data = [PADDING; FRAME_DATA_LEN];
        data[0] = byte;
        Self::from_data(1, data)
    }

    pub fn control(code: ControlCode) -> Self {
        Self::single_byte(code.into())
    }

    pub fn ack() -> Self {
        Self::control(ControlCode::Ack)
    }

    pub fn retx() -> Self {
        Self::control(ControlCode::Retx)
    }

    pub fn from_bytes(raw: &[u8; FRAME_LEN]) -> Self {
        let mut data = [0u8; FRAME_DATA_LEN];
        data.copy_from_slice(&raw[1..CRC_INDEX]);
        Self {
            length: raw[0],
            data,
            crc: raw[CRC_INDEX],
        }
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut raw = [0u8; FRAME_LEN];
        raw[0] = self.length;
        raw[1..CRC_INDEX].copy_from_slice(&self.data);
        raw[CRC_INDEX] = self.crc;
        raw
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn data(&self) -> &[u8; FRAME_DATA_LEN] {
        &self.data
    }

    pub fn crc(&self) -> u8 {
        self.crc
    }

    pub fn compute_crc(&self) -> u8 {
        compute_crc(self.length, &self.data)
    }

    /// Whether the carried checksum matches the frame contents.
    pub fn is_valid(&self) -> bool {
        self.crc == self.compute_crc()
    }

    /// True iff `length == 1`, `data[0] == byte` and the rest is padding.
    pub fn is_single_byte(&self, byte: u8) -> bool {
        self.length == 1 && self.data[0] == byte && self.data[1..].iter().all(|&b| b == PADDING)
    }

    pub fn is_control(&self, code: ControlCode) -> bool {
        self.is_single_byte(code.into())
    }

    pub fn is_ack(&self) -> bool {
        self.is_control(ControlCode::Ack)
    }

    pub fn is_retx(&self) -> bool {
        self.is_control(ControlCode::Retx)
    }

    /// Known control code carried by a single-byte frame.
    pub fn control_code(&self) -> Option<ControlCode> {
        ControlCode::try_from(self.data[0])
            .ok()
            .filter(|&code| self.is_control(code))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.to_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn compute_crc(length: u8, data: &[u8; FRAME_DATA_LEN]) -> u8 {
    let mut buf = [0u8; 1 + FRAME_DATA_LEN];
    buf[0] = length;
    buf[1..].copy_from_slice(data);
    crc8(&buf)
}
