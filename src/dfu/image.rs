use std::path::Path;

use bytes::Bytes;
use ihex::Record;
use log::debug;

use crate::error::{Error, Result};
use crate::protocols::crc::crc32;

/// Marks a valid firmware info block.
pub const FWINFO_SENTINEL: u32 = 0xDEAD_C0DE;
/// Size of the firmware info block that follows the vector table.
pub const FWINFO_SIZE: usize = 16;
const DEVICE_ID_OFFSET: usize = 4;

/// Gap filling for Intel HEX images, same as erased flash.
pub const GAP_FILL: u8 = 0xFF;
/// Largest address span accepted from an Intel HEX file.
pub const MAX_HEX_SPAN: usize = 1024 * 1024;

/// Metadata block the application links right after its vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub sentinel: u32,
    pub device_id: u32,
    pub version: u32,
    pub length: u32,
}

impl FirmwareInfo {
    pub fn from_bytes(raw: &[u8; FWINFO_SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Self {
            sentinel: word(0),
            device_id: word(4),
            version: word(8),
            length: word(12),
        }
    }

    pub fn has_sentinel(&self) -> bool {
        self.sentinel == FWINFO_SENTINEL
    }
}

#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Bytes,
}

impl FirmwareImage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Loads a raw binary, or an Intel HEX file when the extension is `.hex`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_hex = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("hex"));

        if is_hex {
            let text = std::fs::read_to_string(path)?;
            Self::from_ihex(&text)
        } else {
            Ok(Self::new(std::fs::read(path)?))
        }
    }

    /// Flattens Intel HEX records into one image spanning the lowest to the
    /// highest written address.
    pub fn from_ihex(text: &str) -> Result<Self> {
        let mut base: u32 = 0;
        let mut chunks: Vec<(u32, Vec<u8>)> = Vec::new();

        for record in ihex::Reader::new(text) {
            match record? {
                Record::Data { offset, value } => {
                    chunks.push((base.wrapping_add(u32::from(offset)), value));
                }
                Record::ExtendedLinearAddress(upper) => base = u32::from(upper) << 16,
                Record::ExtendedSegmentAddress(segment) => base = u32::from(segment) << 4,
                Record::EndOfFile => break,
                _ => {}
            }
        }

        let Some(start) = chunks.iter().map(|(addr, _)| *addr as usize).min() else {
            return Ok(Self::new(Vec::new()));
        };
        let end = chunks
            .iter()
            .map(|(addr, value)| *addr as usize + value.len())
            .max()
            .unwrap_or(start);

        let span = end - start;
        if span > MAX_HEX_SPAN {
            return Err(Error::FirmwareTooLarge(span));
        }

        debug!("Intel HEX image at {:#010x}, {} bytes", start, span);
        let mut image = vec![GAP_FILL; span];
        for (addr, value) in chunks {
            let offset = addr as usize - start;
            image[offset..offset + value.len()].copy_from_slice(&value);
        }

        Ok(Self::new(image))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Device identifier byte at `vector_table_size + 4`.
    pub fn device_id(&self, vector_table_size: usize) -> Result<u8> {
        let offset = vector_table_size + DEVICE_ID_OFFSET;
        self.data.get(offset).copied().ok_or(Error::ImageTooSmall {
            needed: offset + 1,
            actual: self.data.len(),
        })
    }

    pub fn info(&self, vector_table_size: usize) -> Option<FirmwareInfo> {
        let raw = self
            .data
            .get(vector_table_size..vector_table_size + FWINFO_SIZE)?;
        let mut block = [0u8; FWINFO_SIZE];
        block.copy_from_slice(raw);
        Some(FirmwareInfo::from_bytes(&block))
    }

    pub fn crc32(&self) -> u32 {
        crc32(&self.data, self.data.len())
    }
}
