use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DfuConfig {
    pub uri: String,
    pub baud_rate: u32,
    pub filename: Option<String>,
    /// Wait applied to every expected bootloader reply.
    pub frame_timeout: Duration,
    pub sync_pulse: Duration,
    pub sync_timeout: Duration,
    /// Blind wait while the bootloader erases the application region.
    pub erase_wait: Duration,
    /// Offset of the firmware info block inside the image.
    pub vector_table_size: usize,
}

/// Phases of an update session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Syncing,
    RequestSent,
    AwaitAccept,
    AwaitIdRequest,
    IdSent,
    AwaitLengthRequest,
    LengthSent,
    EraseWait,
    Transfer,
    AwaitSuccess,
    Done,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Syncing => "SYNCING",
            Self::RequestSent => "REQUEST_SENT",
            Self::AwaitAccept => "AWAIT_ACCEPT",
            Self::AwaitIdRequest => "AWAIT_ID_REQUEST",
            Self::IdSent => "ID_SENT",
            Self::AwaitLengthRequest => "AWAIT_LENGTH_REQUEST",
            Self::LengthSent => "LENGTH_SENT",
            Self::EraseWait => "ERASE_WAIT",
            Self::Transfer => "TRANSFER",
            Self::AwaitSuccess => "AWAIT_SUCCESS",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}
