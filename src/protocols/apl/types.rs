use crate::error::Error;

/// Single-byte control codes understood by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCode {
    Ack = 0x15,
    Retx = 0x19,
    SyncObserved = 0x20,
    FwUpdateRequest = 0x31,
    FwUpdateAccepted = 0x37,
    DeviceIdRequest = 0x3C,
    DeviceIdResponse = 0x3F,
    FwLengthRequest = 0x42,
    FwLengthResponse = 0x45,
    ReadyForData = 0x48,
    UpdateSuccessful = 0x54,
    Nack = 0x59,
}

impl From<ControlCode> for u8 {
    fn from(code: ControlCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ControlCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x15 => Ok(Self::Ack),
            0x19 => Ok(Self::Retx),
            0x20 => Ok(Self::SyncObserved),
            0x31 => Ok(Self::FwUpdateRequest),
            0x37 => Ok(Self::FwUpdateAccepted),
            0x3C => Ok(Self::DeviceIdRequest),
            0x3F => Ok(Self::DeviceIdResponse),
            0x42 => Ok(Self::FwLengthRequest),
            0x45 => Ok(Self::FwLengthResponse),
            0x48 => Ok(Self::ReadyForData),
            0x54 => Ok(Self::UpdateSuccessful),
            0x59 => Ok(Self::Nack),
            _ => Err(Error::UnknownControlCode(value)),
        }
    }
}
