use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::protocols::apl::{self, ControlCode, SYNC_SEQ};
use crate::protocols::lpl::{Frame, LplStream, FRAME_DATA_LEN};

mod config;
mod image;
mod types;


pub use config::*;
pub use image::*;
pub use types::*;

const ERASE_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Drives one firmware update over a bootloader link.
///
/// A session runs front to back. Any failure aborts it and the next attempt
/// has to start again from the sync handshake.
pub struct DfuStream<T> {
    lpl: LplStream<T>,
    config: DfuConfig,
    state: UpdateState,
    bytes_written: usize,
}

impl<T: AsyncRead + AsyncWrite + Unpin> DfuStream<T> {
    pub fn new(stream: T, config: DfuConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            lpl: LplStream::new(stream),
            config,
            state: UpdateState::Idle,
            bytes_written: 0,
        })
    }

    /// Phase the session is in, or stopped in after a failure.
    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn into_inner(self) -> T {
        self.lpl.into_inner()
    }

    /// Runs a whole session. Calling it again after a failure starts over
    /// from the sync handshake and the first byte of the image.
    pub async fn update(&mut self, image: &FirmwareImage) -> Result<()> {
        self.state = UpdateState::Idle;
        self.bytes_written = 0;
        self.lpl.reset();

        let device_id = image.device_id(self.config.vector_table_size)?;
        let length =
            u32::try_from(image.len()).map_err(|_| Error::FirmwareTooLarge(image.len()))?;
        self.check_info(image);

        info!("Starting firmware update ({} bytes)", length);

        self.enter(UpdateState::Syncing);
        self.sync().await?;

        info!("Requesting firmware update");
        self.enter(UpdateState::RequestSent);
        self.lpl
            .send(Frame::control(ControlCode::FwUpdateRequest))
            .await?;
        self.enter(UpdateState::AwaitAccept);
        self.expect(ControlCode::FwUpdateAccepted).await?;
        info!("Firmware update request accepted");

        self.enter(UpdateState::AwaitIdRequest);
        self.expect(ControlCode::DeviceIdRequest).await?;

        self.enter(UpdateState::IdSent);
        info!("Responding with device ID {:#04x}", device_id);
        self.lpl.send(apl::device_id_response(device_id)).await?;

        self.enter(UpdateState::AwaitLengthRequest);
        self.expect(ControlCode::FwLengthRequest).await?;

        self.enter(UpdateState::LengthSent);
        info!("Responding with firmware length");
        self.lpl.send(apl::firmware_length_response(length)).await?;

        self.enter(UpdateState::EraseWait);
        self.erase_wait().await?;

        self.enter(UpdateState::Transfer);
        self.transfer(image).await?;

        self.enter(UpdateState::AwaitSuccess);
        self.expect(ControlCode::UpdateSuccessful).await?;

        self.enter(UpdateState::Done);
        info!("Firmware update complete");
        Ok(())
    }

    /// Sends the sync sequence once per pulse until the bootloader answers
    /// with `SyncObserved`.
    async fn sync(&mut self) -> Result<()> {
        let pulse = self.config.sync_pulse;
        let timeout = self.config.sync_timeout;
        let mut waited = Duration::ZERO;

        info!("Attempting to sync with the bootloader");
        loop {
            debug!("Sending sync sequence");
            self.lpl.send_raw(&SYNC_SEQ).await?;
            self.lpl.service(pulse).await?;
            waited += pulse;

            // A reply is checked before the elapsed time.
            if let Some(frame) = self.lpl.take_pending() {
                if frame.is_control(ControlCode::SyncObserved) {
                    info!("Synced");
                    return Ok(());
                }

                error!("Wrong frame observed during sync: {}", frame);
                return Err(Error::UnexpectedFrame {
                    expected: ControlCode::SyncObserved.into(),
                    received: frame.to_bytes(),
                });
            }

            if waited >= timeout {
                error!("Timed out waiting for sync sequence to be observed");
                return Err(Error::SyncTimeout(timeout));
            }
        }
    }

    async fn erase_wait(&mut self) -> Result<()> {
        let total = self.config.erase_wait;
        let mut waited = Duration::ZERO;

        info!("Waiting {:?} for the application to be erased", total);
        while waited < total {
            let step = (total - waited).min(ERASE_PROGRESS_INTERVAL);
            self.lpl.service(step).await?;
            waited += step;
            debug!("Erase wait: {:?} of {:?}", waited, total);
        }
        Ok(())
    }

    async fn transfer(&mut self, image: &FirmwareImage) -> Result<()> {
        let data = image.as_bytes();
        let total = data.len();

        while self.bytes_written < total {
            self.expect(ControlCode::ReadyForData).await?;

            let end = (self.bytes_written + FRAME_DATA_LEN).min(total);
            let chunk = &data[self.bytes_written..end];
            self.lpl.send(apl::data_chunk(chunk)?).await?;
            self.bytes_written = end;

            info!("Wrote {} bytes ({}/{})", chunk.len(), self.bytes_written, total);
        }
        Ok(())
    }

    async fn expect(&mut self, code: ControlCode) -> Result<()> {
        self.lpl
            .recv_control(code.into(), self.config.frame_timeout)
            .await
    }

    fn check_info(&self, image: &FirmwareImage) {
        let Some(info) = image.info(self.config.vector_table_size) else {
            debug!("Image too small to carry a firmware info block");
            return;
        };

        if !info.has_sentinel() {
            warn!(
                "Firmware info sentinel is {:#010x}, expected {:#010x}",
                info.sentinel, FWINFO_SENTINEL
            );
        }
        if info.length as usize != image.len() {
            warn!(
                "Firmware info length {} differs from image size {}, sending the image size",
                info.length,
                image.len()
            );
        }
        debug!(
            "Firmware info: device {:#04x}, version {:#x}",
            info.device_id, info.version
        );
    }

    fn enter(&mut self, state: UpdateState) {
        debug!("{} -> {}", self.state, state);
        self.state = state;
    }
}
