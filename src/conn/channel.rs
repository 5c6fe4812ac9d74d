//! Frame channel
//!
//! Timed frame reads and byte-exact frame writes over a [`SessionOps`]
//! transport. Nothing written through the raw path is validated or
//! corrected.

use crate::h2::codec::{FrameCodec, FRAME_HEADER_SIZE};
use crate::h2::{Error, Frame, Result};
use crate::session::SessionOps;
use bytes::{Buf, Bytes, BytesMut};
use log::trace;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 16 * 1024;

/// Transport wrapper carrying HTTP/2 frames
pub struct FrameChannel {
    session: Box<dyn SessionOps>,
    buf: BytesMut,
    closed: bool,
}

impl FrameChannel {
    /// Wrap a transport
    pub fn new(session: Box<dyn SessionOps>) -> Self {
        FrameChannel {
            session,
            buf: BytesMut::with_capacity(READ_CHUNK),
            closed: false,
        }
    }

    /// Whether the channel has been closed by either side
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.peer_addr()
    }

    /// Write arbitrary octets
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let mut written = 0;
        while written < data.len() {
            match self.session.write(&data[written..]) {
                Ok(0) => {
                    self.closed = true;
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => written += n,
                Err(e) => return Err(self.classify(e)),
            }
        }

        self.session.flush().map_err(|e| self.classify(e))
    }

    /// Write an encoded, well-formed frame
    pub fn write_frame(&mut self, encoded: &[u8]) -> Result<()> {
        if encoded.len() >= FRAME_HEADER_SIZE {
            trace!("send {}", describe_header(&encoded[..FRAME_HEADER_SIZE]));
        }
        self.write_bytes(encoded)
    }

    /// Write a frame header and payload exactly as given
    pub fn write_raw(&mut self, frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Result<()> {
        self.write_raw_with_len(frame_type, flags, stream_id, payload.len() as u32, payload)
    }

    /// Write a frame whose length field may disagree with the payload
    pub fn write_raw_with_len(
        &mut self,
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        length: u32,
        payload: &[u8],
    ) -> Result<()> {
        let encoded = FrameCodec::encode_raw_frame_with_len(frame_type, flags, stream_id, length, payload);
        trace!("send raw {}", describe_header(&encoded[..FRAME_HEADER_SIZE]));
        self.write_bytes(&encoded)
    }

    /// Read exactly `n` octets, e.g. the connection preface
    pub fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        while self.buf.len() < n {
            self.fill(deadline)?;
        }
        Ok(self.buf.split_to(n).freeze())
    }

    /// Read one whole frame, waiting at most `timeout`
    ///
    /// EOF marks the channel closed and yields `ConnectionClosed`.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.take_frame() {
                trace!("recv {}", frame);
                return Ok(frame);
            }
            self.fill(deadline)?;
        }
    }

    /// Close the transport
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session.close()
    }

    fn take_frame(&mut self) -> Option<Frame> {
        if self.buf.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&self.buf[..FRAME_HEADER_SIZE]);
        let (_, _, _, length) = FrameCodec::decode_header(&header);

        if self.buf.len() < FRAME_HEADER_SIZE + length {
            return None;
        }

        self.buf.advance(FRAME_HEADER_SIZE);
        let payload = self.buf.split_to(length).freeze();
        Some(Frame::from_parts(header, payload))
    }

    fn fill(&mut self, deadline: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !self.session.poll_read(Some(remaining))? {
            return Err(Error::Timeout);
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.session.read(&mut chunk) {
            Ok(0) => {
                trace!("peer closed the connection");
                self.closed = true;
                Err(Error::ConnectionClosed)
            }
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(e) => Err(self.classify(e)),
        }
    }

    /// Map transport failures onto the engine's taxonomy
    fn classify(&mut self, err: Error) -> Error {
        let kind = match &err {
            Error::Io(e) => e.kind(),
            _ => return err,
        };

        match kind {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => {
                self.closed = true;
                Error::ConnectionClosed
            }
            _ => err,
        }
    }
}

fn describe_header(header: &[u8]) -> String {
    let mut raw = [0u8; FRAME_HEADER_SIZE];
    raw.copy_from_slice(&header[..FRAME_HEADER_SIZE]);
    Frame::from_parts(raw, Bytes::new()).to_string()
}
