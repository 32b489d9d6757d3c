//! Bootloader-level messages carried inside link frames.

mod packet;
mod types;

pub use self::packet::{data_chunk, device_id_response, firmware_length_response};
pub use self::types::ControlCode;

/// Out-of-band byte pattern the bootloader watches for before framing starts.
/// Sent raw, never inside a frame.
pub const SYNC_SEQ: [u8; 4] = [0xC4, 0x55, 0x7E, 0x10];
