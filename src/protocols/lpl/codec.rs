use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Frame, FRAME_LEN};

/// Slices the inbound byte stream into fixed-size frames.
///
/// There is no resynchronization: every [`FRAME_LEN`] bytes are taken as one
/// frame, so the stream must already be aligned by the sync handshake.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if src.len() < FRAME_LEN {
            src.reserve(FRAME_LEN - src.len());
            return Ok(None);
        }

        let raw = src.split_to(FRAME_LEN);
        let mut bytes = [0u8; FRAME_LEN];
        bytes.copy_from_slice(&raw);
        Ok(Some(Frame::from_bytes(&bytes)))
    }

    // A partial frame left at end of stream is dropped.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        self.decode(src)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(FRAME_LEN);
        dst.put_slice(&frame.to_bytes());
        Ok(())
    }
}
