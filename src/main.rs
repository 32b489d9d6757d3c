//! bl-fwupd - push a firmware image to the serial bootloader.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bl_fwupd::{DfuConfig, DfuStream, FirmwareImage, DEFAULT_BAUD_RATE, DEFAULT_PORT};
use clap::Parser;
use env_logger::Env;
use log::{debug, info};

/// Update the application firmware through the device bootloader.
///
/// Environment variables:
///   FWUPD_PORT  - Default serial port
///   FWUPD_BAUD  - Default baud rate
#[derive(Parser)]
#[command(name = "bl-fwupd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Firmware image to flash (raw binary, or Intel HEX with a .hex extension).
    #[arg(value_name = "FIRMWARE", required_unless_present = "list_ports")]
    firmware: Option<PathBuf>,

    /// Serial port the bootloader is attached to.
    #[arg(short, long, env = "FWUPD_PORT", default_value = DEFAULT_PORT)]
    port: String,

    /// Baud rate.
    #[arg(short, long, env = "FWUPD_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// How long to wait for each bootloader reply, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 60_000)]
    timeout_ms: u64,

    /// Interval between sync sequences, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 120_000)]
    sync_pulse_ms: u64,

    /// Give up syncing after this long, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 60_000)]
    sync_timeout_ms: u64,

    /// Time the bootloader needs to erase the application, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 15_000)]
    erase_wait_ms: u64,

    /// Size of the vector table preceding the firmware info block.
    #[arg(long, value_name = "BYTES", default_value = "0x1B0", value_parser = parse_size)]
    vector_table_size: usize,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only warnings and errors).
    #[arg(short, long)]
    quiet: bool,
}

fn parse_size(s: &str) -> std::result::Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid size '{s}': {e}"))
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!("bl-fwupd v{}", env!("CARGO_PKG_VERSION"));

    if cli.list_ports {
        return list_ports();
    }

    let firmware = cli.firmware.context("No firmware image given")?;
    let config = DfuConfig::new()
        .with_uri(cli.port)
        .with_baud_rate(cli.baud)
        .with_firmware(firmware.to_string_lossy())
        .with_frame_timeout(Duration::from_millis(cli.timeout_ms))
        .with_sync_pulse(Duration::from_millis(cli.sync_pulse_ms))
        .with_sync_timeout(Duration::from_millis(cli.sync_timeout_ms))
        .with_erase_wait(Duration::from_millis(cli.erase_wait_ms))
        .with_vector_table_size(cli.vector_table_size);
    config.validate().context("Invalid settings")?;

    // Read once up front so a bad image fails before the port is touched.
    let image = FirmwareImage::load(&firmware)
        .with_context(|| format!("Failed to read {}", firmware.display()))?;
    info!(
        "Firmware image: {} bytes, CRC32 {:#010x}",
        image.len(),
        image.crc32()
    );
    if let Some(info) = image.info(config.vector_table_size) {
        debug!("Firmware info: {:?}", info);
    }

    let stream = bl_fwupd::open_serial(&config)
        .with_context(|| format!("Failed to open {}", config.uri))?;
    let mut dfu = DfuStream::new(stream, config)?;
    dfu.update(&image)
        .await
        .with_context(|| format!("Firmware update failed in {}", dfu.state()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_accept_hex_and_decimal() {
        assert_eq!(parse_size("0x1B0"), Ok(0x1B0));
        assert_eq!(parse_size("432"), Ok(432));
        assert!(parse_size("0xZZ").is_err());
    }

    #[test]
    fn firmware_is_required_unless_listing() {
        assert!(Cli::try_parse_from(["bl-fwupd"]).is_err());
        assert!(Cli::try_parse_from(["bl-fwupd", "--list-ports"]).is_ok());

        let cli =
            Cli::try_parse_from(["bl-fwupd", "fw.bin", "-p", "/dev/ttyUSB0", "-vv"]).unwrap();
        assert_eq!(cli.firmware, Some(PathBuf::from("fw.bin")));
        assert_eq!(cli.port, "/dev/ttyUSB0");
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.vector_table_size, 0x1B0);
    }
}
