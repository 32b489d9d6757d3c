use crate::error::{Error, Result};
use crate::protocols::lpl::{Frame, FRAME_DATA_LEN, PADDING};

use super::ControlCode;

/// `[DeviceIdResponse, id]`, length 2.
pub fn device_id_response(device_id: u8) -> Frame {
    let mut data = [PADDING; FRAME_DATA_LEN];
    data[0] = ControlCode::DeviceIdResponse.into();
    data[1] = device_id;
    Frame::from_data(2, data)
}

/// `[FwLengthResponse, length as u32 LE]`, length 5.
pub fn firmware_length_response(length: u32) -> Frame {
    let mut data = [PADDING; FRAME_DATA_LEN];
    data[0] = ControlCode::FwLengthResponse.into();
    data[1..5].copy_from_slice(&length.to_le_bytes());
    Frame::from_data(5, data)
}

/// Firmware data frame.
///
/// The length field holds `chunk.len() - 1` so a full 16-byte chunk fits in
/// four bits.
pub fn data_chunk(chunk: &[u8]) -> Result<Frame> {
    let length = u8::try_from(chunk.len())
        .ok()
        .and_then(|n| n.checked_sub(1))
        .ok_or(Error::InvalidPayload(chunk.len()))?;
    Frame::new(length, chunk)
}
