use std::time::Duration;

use thiserror::Error;

use crate::protocols::lpl::FRAME_LEN;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Timed out after {0:?} waiting for a frame")]
    Timeout(Duration),

    #[error("Timed out after {0:?} waiting for the bootloader to observe the sync sequence")]
    SyncTimeout(Duration),

    #[error("Unexpected frame: expected single byte {expected:#04x}, got {}", hex(.received))]
    UnexpectedFrame {
        expected: u8,
        received: [u8; FRAME_LEN],
    },

    #[error("Received NACK, the bootloader rejected the update")]
    Nack,

    #[error("Unknown control code: {0:#04x}")]
    UnknownControlCode(u8),

    #[error("Invalid frame payload size: {0} bytes")]
    InvalidPayload(usize),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Hex file error: {0}")]
    HexFile(#[from] ihex::ReaderError),

    #[error("No firmware file specified")]
    NoFirmwareFile,

    #[error("Firmware image too small: need at least {needed} bytes, got {actual}")]
    ImageTooSmall { needed: usize, actual: usize },

    #[error("Firmware too large: {0} bytes")]
    FirmwareTooLarge(usize),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
