use std::time::Duration;

use super::types::DfuConfig;
use crate::error::{Error, Result};

pub const DEFAULT_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);
// The pulse is longer than the overall sync timeout; kept as the bootloader
// tooling ships it until calibrated on hardware.
pub const DEFAULT_SYNC_PULSE: Duration = Duration::from_millis(120_000);
pub const DEFAULT_ERASE_WAIT: Duration = Duration::from_secs(15);
pub const DEFAULT_VECTOR_TABLE_SIZE: usize = 0x01B0;

impl Default for DfuConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            filename: None,
            frame_timeout: DEFAULT_TIMEOUT,
            sync_pulse: DEFAULT_SYNC_PULSE,
            sync_timeout: DEFAULT_TIMEOUT,
            erase_wait: DEFAULT_ERASE_WAIT,
            vector_table_size: DEFAULT_VECTOR_TABLE_SIZE,
        }
    }
}

impl DfuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_firmware(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn with_sync_pulse(mut self, pulse: Duration) -> Self {
        self.sync_pulse = pulse;
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_erase_wait(mut self, wait: Duration) -> Self {
        self.erase_wait = wait;
        self
    }

    pub fn with_vector_table_size(mut self, size: usize) -> Self {
        self.vector_table_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_timeout.is_zero() {
            return Err(Error::Configuration("frame timeout must be non-zero".into()));
        }

        // A zero pulse would spin on the sync sequence without ever reading.
        if self.sync_pulse.is_zero() {
            return Err(Error::Configuration("sync pulse must be non-zero".into()));
        }

        Ok(())
    }

    pub(crate) fn validate_port(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(Error::Configuration("serial port must be specified".into()));
        }
        if self.baud_rate == 0 {
            return Err(Error::Configuration("baud rate must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bootloader_tooling() {
        let config = DfuConfig::new();
        assert_eq!(config.uri, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.frame_timeout, Duration::from_secs(60));
        assert_eq!(config.sync_pulse, Duration::from_secs(120));
        assert_eq!(config.sync_timeout, Duration::from_secs(60));
        assert_eq!(config.erase_wait, Duration::from_secs(15));
        assert_eq!(config.vector_table_size, 0x1B0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = DfuConfig::new()
            .with_uri("/dev/ttyUSB1")
            .with_baud_rate(9600)
            .with_firmware("fw.bin")
            .with_erase_wait(Duration::ZERO)
            .with_vector_table_size(0x100);
        assert_eq!(config.uri, "/dev/ttyUSB1");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.filename.as_deref(), Some("fw.bin"));
        assert!(config.erase_wait.is_zero());
        assert_eq!(config.vector_table_size, 0x100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timings_are_rejected() {
        let config = DfuConfig::new().with_frame_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = DfuConfig::new().with_sync_pulse(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn empty_port_is_rejected() {
        let config = DfuConfig::new().with_uri("");
        assert!(config.validate().is_ok());
        assert!(matches!(config.validate_port(), Err(Error::Configuration(_))));
    }
}
