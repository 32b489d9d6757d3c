pub mod apl;
pub mod crc;
pub mod lpl;
