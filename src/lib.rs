//! Serial Bootloader Firmware Update Library
//!
//! Host side of a small framed protocol used to push a firmware image to a
//! device-resident bootloader over a serial link.
//!
//! # Protocol Stack
//! - Link Protocol Layer (LPL): fixed 18-byte frames with a CRC-8 trailer,
//!   ACK / retransmit-request handling and an inbound frame queue
//! - Application Protocol Layer (APL): single-byte control codes and the
//!   device-ID, firmware-length and data frames built on top of them
//! - DFU: sync handshake and the update state machine
//!
//! # Example
//! ```no_run
//! use bl_fwupd::DfuConfig;
//!
//! #[tokio::main]
//! async fn main() -> bl_fwupd::Result<()> {
//!     let config = DfuConfig::new()
//!         .with_uri("/dev/ttyACM0")
//!         .with_firmware("firmware.bin");
//!
//!     let stream = bl_fwupd::open_serial(&config)?;
//!     bl_fwupd::update_firmware(stream, config).await
//! }
//! ```

mod dfu;
mod error;
mod protocols;

pub use dfu::{
    DfuConfig, DfuStream, FirmwareImage, FirmwareInfo, UpdateState, DEFAULT_BAUD_RATE,
    DEFAULT_ERASE_WAIT, DEFAULT_PORT, DEFAULT_SYNC_PULSE, DEFAULT_TIMEOUT,
    DEFAULT_VECTOR_TABLE_SIZE, FWINFO_SENTINEL,
};
pub use error::{Error, Result};
pub use protocols::apl::{ControlCode, SYNC_SEQ};
pub use protocols::crc::{crc32, crc8};
pub use protocols::lpl::{Frame, FrameCodec, LplStream, FRAME_DATA_LEN, FRAME_LEN, PADDING};

use log::info;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Opens the serial port named by `config.uri` at `config.baud_rate`, 8N1.
pub fn open_serial(config: &DfuConfig) -> Result<SerialStream> {
    config.validate_port()?;
    info!("Opening {} at {} baud", config.uri, config.baud_rate);
    let stream = tokio_serial::new(&config.uri, config.baud_rate).open_native_async()?;
    Ok(stream)
}

/// Loads the image named by `config.filename` and runs a full update over
/// `stream`. The stream is dropped when the session ends, whatever the
/// outcome.
pub async fn update_firmware<T>(stream: T, config: DfuConfig) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let filename = config.filename.as_ref().ok_or(Error::NoFirmwareFile)?;
    let image = FirmwareImage::load(filename)?;
    info!("Read firmware image ({} bytes)", image.len());

    let mut dfu = DfuStream::new(stream, config)?;
    dfu.update(&image).await
}

/// Creates a new DFU configuration with default settings
pub fn new_config() -> DfuConfig {
    DfuConfig::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_requires_firmware_file() {
        let (host, _peer) = tokio::io::duplex(64);
        assert!(matches!(
            update_firmware(host, new_config()).await,
            Err(Error::NoFirmwareFile)
        ));
    }

    #[tokio::test]
    async fn missing_firmware_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let (host, _peer) = tokio::io::duplex(64);
        let config = new_config().with_firmware(path.to_string_lossy());

        assert!(matches!(
            update_firmware(host, config).await,
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn empty_port_is_rejected_before_opening() {
        let config = new_config().with_uri("");
        assert!(matches!(open_serial(&config), Err(Error::Configuration(_))));
    }
}
