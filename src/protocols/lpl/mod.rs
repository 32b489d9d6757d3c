//! Link Protocol Layer.
//!
//! Turns the raw byte stream into checksummed frames and keeps the link
//! reliable: corrupted frames are answered with a retransmit request, a
//! retransmit request from the peer resends the last frame, and every
//! accepted frame is acknowledged and queued for the caller.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use log::{debug, error, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;

use crate::error::{Error, Result};
use crate::protocols::apl::ControlCode;

mod codec;
mod types;

pub use self::codec::FrameCodec;
pub use self::types::{Frame, FRAME_DATA_LEN, FRAME_LEN, PADDING};

pub struct LplStream<T> {
    framed: Framed<T, FrameCodec>,
    pending: VecDeque<Frame>,
    last_sent: Frame,
    closed: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin> LplStream<T> {
    pub fn new(stream: T) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec),
            pending: VecDeque::new(),
            last_sent: Frame::single_byte(PADDING),
            closed: false,
        }
    }

    pub fn into_inner(self) -> T {
        self.framed.into_inner()
    }

    /// Most recently transmitted frame, resent when the peer asks.
    pub fn last_sent(&self) -> &Frame {
        &self.last_sent
    }

    /// Number of accepted frames not yet taken by the caller.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Takes the oldest accepted frame without waiting.
    pub fn take_pending(&mut self) -> Option<Frame> {
        self.pending.pop_front()
    }

    /// Forgets everything left over from an earlier session: queued frames,
    /// partially received bytes and the retransmission slot.
    pub fn reset(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} stale frame(s)", self.pending.len());
        }
        self.pending.clear();
        self.framed.read_buffer_mut().clear();
        self.last_sent = Frame::single_byte(PADDING);
    }

    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        trace!("TX {}", frame);
        self.framed.send(frame).await?;
        self.last_sent = frame;
        Ok(())
    }

    /// Writes bytes straight to the transport, bypassing framing.
    ///
    /// Does not touch the retransmission slot.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Waits for the next accepted frame.
    pub async fn recv_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain_ready().await?;
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }
            if !self.wait_inbound(deadline).await? {
                return Err(Error::Timeout(timeout));
            }
        }
    }

    /// Waits for the next accepted frame and requires it to be the
    /// single-byte frame `byte`.
    pub async fn recv_control(&mut self, byte: u8, timeout: Duration) -> Result<()> {
        let frame = self.recv_frame(timeout).await?;
        if frame.is_single_byte(byte) {
            return Ok(());
        }

        error!("Unexpected frame, expected {:#04x}, got {}", byte, frame);
        Err(Error::UnexpectedFrame {
            expected: byte,
            received: frame.to_bytes(),
        })
    }

    /// Keeps handling inbound frames for `duration`. Accepted frames stay
    /// queued.
    pub async fn service(&mut self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        self.drain_ready().await?;
        while self.wait_inbound(deadline).await? {}
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        trace!("RX {}", frame);

        if !frame.is_valid() {
            warn!(
                "CRC mismatch: got {:#04x}, computed {:#04x}, requesting retransmission",
                frame.crc(),
                frame.compute_crc()
            );
            return self.send(Frame::retx()).await;
        }

        if frame.is_retx() {
            debug!("Peer requested retransmission");
            let last = self.last_sent;
            return self.send(last).await;
        }

        if frame.is_ack() {
            return Ok(());
        }

        if frame.is_control(ControlCode::Nack) {
            error!("Received NACK");
            return Err(Error::Nack);
        }

        debug!("Queued frame {:?}", frame.control_code());
        self.pending.push_back(frame);
        self.send(Frame::ack()).await
    }

    // Handles every frame that is decodable right now, without waiting.
    async fn drain_ready(&mut self) -> Result<()> {
        while !self.closed {
            match self.framed.next().now_or_never() {
                Some(Some(frame)) => self.handle_frame(frame?).await?,
                Some(None) => self.closed = true,
                None => break,
            }
        }
        Ok(())
    }

    // Returns false once `deadline` passes with nothing received.
    async fn wait_inbound(&mut self, deadline: Instant) -> Result<bool> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        match time::timeout_at(deadline, self.framed.next()).await {
            Err(_) => Ok(false),
            Ok(None) => {
                self.closed = true;
                Err(Error::ConnectionClosed)
            }
            Ok(Some(frame)) => {
                self.handle_frame(frame?).await?;
                self.drain_ready().await?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    const WAIT: Duration = Duration::from_millis(100);

    fn link() -> (LplStream<DuplexStream>, DuplexStream) {
        let (host, peer) = duplex(4096);
        (LplStream::new(host), peer)
    }

    async fn read_frame(peer: &mut DuplexStream) -> Frame {
        let mut raw = [0u8; FRAME_LEN];
        peer.read_exact(&mut raw).await.unwrap();
        Frame::from_bytes(&raw)
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_frame_is_queued_and_acked() {
        let (mut lpl, mut peer) = link();
        let frame = Frame::control(ControlCode::ReadyForData);
        peer.write_all(&frame.to_bytes()).await.unwrap();

        assert_eq!(lpl.recv_frame(WAIT).await.unwrap(), frame);
        assert_eq!(read_frame(&mut peer).await, Frame::ack());
        assert_eq!(lpl.last_sent(), &Frame::ack());
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_frame_requests_one_retransmission() {
        let (mut lpl, mut peer) = link();
        let mut raw = Frame::control(ControlCode::ReadyForData).to_bytes();
        raw[17] ^= 0xFF;
        peer.write_all(&raw).await.unwrap();

        assert!(matches!(lpl.recv_frame(WAIT).await, Err(Error::Timeout(_))));
        assert_eq!(lpl.pending(), 0);

        let good = Frame::control(ControlCode::UpdateSuccessful);
        peer.write_all(&good.to_bytes()).await.unwrap();
        assert_eq!(lpl.recv_frame(WAIT).await.unwrap(), good);

        assert_eq!(read_frame(&mut peer).await, Frame::retx());
        assert_eq!(read_frame(&mut peer).await, Frame::ack());
    }

    #[tokio::test(start_paused = true)]
    async fn retransmit_request_resends_last_frame() {
        let (mut lpl, mut peer) = link();
        let sent = Frame::new(5, &[0x45, 20, 0, 0, 0]).unwrap();
        lpl.send(sent).await.unwrap();
        assert_eq!(read_frame(&mut peer).await, sent);

        peer.write_all(&Frame::retx().to_bytes()).await.unwrap();
        lpl.service(WAIT).await.unwrap();

        assert_eq!(read_frame(&mut peer).await.to_bytes(), sent.to_bytes());
        assert_eq!(lpl.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retransmit_request_after_ack_resends_ack() {
        let (mut lpl, mut peer) = link();
        let frame = Frame::control(ControlCode::DeviceIdRequest);
        peer.write_all(&frame.to_bytes()).await.unwrap();
        assert_eq!(lpl.recv_frame(WAIT).await.unwrap(), frame);
        assert_eq!(read_frame(&mut peer).await, Frame::ack());

        peer.write_all(&Frame::retx().to_bytes()).await.unwrap();
        lpl.service(WAIT).await.unwrap();

        assert_eq!(read_frame(&mut peer).await.to_bytes(), Frame::ack().to_bytes());
        assert_eq!(lpl.last_sent(), &Frame::ack());
        assert_eq!(lpl.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_queued_frames_and_partial_bytes() {
        let (mut lpl, mut peer) = link();
        let stale = Frame::control(ControlCode::ReadyForData);
        peer.write_all(&stale.to_bytes()).await.unwrap();
        peer.write_all(&stale.to_bytes()[..7]).await.unwrap();
        lpl.service(WAIT).await.unwrap();
        assert_eq!(lpl.pending(), 1);

        lpl.reset();
        assert_eq!(lpl.pending(), 0);
        assert_eq!(lpl.last_sent(), &Frame::single_byte(PADDING));

        let fresh = Frame::control(ControlCode::SyncObserved);
        peer.write_all(&fresh.to_bytes()).await.unwrap();
        assert_eq!(lpl.recv_frame(WAIT).await.unwrap(), fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_is_swallowed() {
        let (mut lpl, mut peer) = link();
        peer.write_all(&Frame::ack().to_bytes()).await.unwrap();

        assert!(matches!(lpl.recv_frame(WAIT).await, Err(Error::Timeout(_))));
        assert_eq!(lpl.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nack_is_fatal() {
        let (mut lpl, mut peer) = link();
        peer.write_all(&Frame::control(ControlCode::Nack).to_bytes())
            .await
            .unwrap();

        assert!(matches!(lpl.recv_frame(WAIT).await, Err(Error::Nack)));
        assert_eq!(lpl.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nack_in_same_burst_wins_over_queued_frame() {
        let (mut lpl, mut peer) = link();
        let mut burst = Frame::control(ControlCode::FwUpdateAccepted).to_bytes().to_vec();
        burst.extend_from_slice(&Frame::control(ControlCode::Nack).to_bytes());
        peer.write_all(&burst).await.unwrap();

        assert!(matches!(lpl.recv_frame(WAIT).await, Err(Error::Nack)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_on_empty_queue() {
        let (mut lpl, _peer) = link();
        let started = Instant::now();

        let result = lpl
            .recv_control(ControlCode::ReadyForData.into(), Duration::ZERO)
            .await;

        assert!(matches!(result, Err(Error::Timeout(d)) if d.is_zero()));
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_control_code_is_reported() {
        let (mut lpl, mut peer) = link();
        let frame = Frame::control(ControlCode::DeviceIdRequest);
        peer.write_all(&frame.to_bytes()).await.unwrap();

        match lpl.recv_control(ControlCode::FwUpdateAccepted.into(), WAIT).await {
            Err(Error::UnexpectedFrame { expected, received }) => {
                assert_eq!(expected, 0x37);
                assert_eq!(received, frame.to_bytes());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn split_delivery_is_reassembled() {
        let (mut lpl, mut peer) = link();
        let frame = Frame::new(3, &[1, 2, 3, 4]).unwrap();
        let raw = frame.to_bytes();

        peer.write_all(&raw[..5]).await.unwrap();
        lpl.service(WAIT).await.unwrap();
        assert_eq!(lpl.pending(), 0);

        peer.write_all(&raw[5..]).await.unwrap();
        assert_eq!(lpl.recv_frame(WAIT).await.unwrap(), frame);
    }

    #[tokio::test(start_paused = true)]
    async fn raw_bytes_bypass_framing() {
        let (mut lpl, mut peer) = link();
        lpl.send_raw(&[0xC4, 0x55, 0x7E, 0x10]).await.unwrap();

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xC4, 0x55, 0x7E, 0x10]);
        assert_eq!(lpl.last_sent(), &Frame::single_byte(PADDING));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_peer_is_reported() {
        let (mut lpl, peer) = link();
        drop(peer);

        assert!(matches!(
            lpl.recv_frame(WAIT).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
