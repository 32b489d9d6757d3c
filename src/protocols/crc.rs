//! Checksums shared with the bootloader.
//!
//! The frame checksum is CRC-8 with polynomial `0x07`, zero initial value and
//! no reflection (CRC-8/SMBUS). The image checksum is the standard reflected
//! CRC-32 (`0xEDB88320`, as used by zlib).

use crc::{Crc, CRC_8_SMBUS};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC-8 over `data`, matching the bootloader's bit-serial implementation.
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// CRC-32 over the first `length` bytes of `data`.
///
/// `length` is clamped to `data.len()`.
pub fn crc32(data: &[u8], length: usize) -> u32 {
    crc32fast::hash(&data[..length.min(data.len())])
}
