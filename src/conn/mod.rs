//! HTTP/2 test connection
//!
//! A [`Conn`] owns one [`FrameChannel`] and the per-connection protocol
//! state: the HPACK encoder/decoder pair, the handshake state, the highest
//! stream ID seen and frames queued during the SETTINGS exchange.
//!
//! The same type serves both drivers. In the client role we dial a server
//! under test; in the server role we accept a client under test.

mod channel;
mod verify;

pub use channel::FrameChannel;

use crate::config::{Config, Timeouts};
use crate::h2::frames::*;
use crate::h2::settings::default_settings;
use crate::h2::{Error, ErrorCode, FrameCodec, Result, Settings, CONNECTION_PREFACE};
use crate::session::{FdSessionOps, SessionOps};
use crate::tls::{TlsConfig, TlsSessionOps};
use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use std::collections::VecDeque;
use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// Which side of the connection we play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We connected to a server under test
    Client,
    /// A client under test connected to us
    Server,
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    New,
    Handshaking,
    Established,
    Closing,
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnState::New => "new",
            ConnState::Handshaking => "handshaking",
            ConnState::Established => "established",
            ConnState::Closing => "closing",
            ConnState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A request read from a client under test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Stream the request arrived on
    pub stream_id: u32,
    /// Decoded header fields in wire order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
}

impl Request {
    /// First value of a header field
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Pseudo-header set for a request to the configured target
pub fn common_headers(config: &Config) -> Vec<(String, String)> {
    vec![
        (":method".to_string(), "GET".to_string()),
        (":scheme".to_string(), config.scheme().to_string()),
        (":path".to_string(), config.path.clone()),
        (":authority".to_string(), config.authority()),
    ]
}

/// Header set for a plain 200 response
pub fn common_resp_headers() -> Vec<(String, String)> {
    vec![(":status".to_string(), "200".to_string())]
}

/// Header block being assembled from HEADERS + CONTINUATION
struct PartialBlock {
    stream_id: u32,
    end_stream: bool,
    block: BytesMut,
}

/// A header block after decoding
pub(crate) struct HeaderBlock {
    pub(crate) stream_id: u32,
    pub(crate) end_stream: bool,
    pub(crate) headers: Vec<(String, String)>,
}

/// HTTP/2 connection used by test cases
pub struct Conn {
    channel: FrameChannel,
    role: Role,
    state: ConnState,
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
    decoder_failed: bool,
    settings: Settings,
    peer_settings: Settings,
    last_stream_id: u32,
    partial: Option<PartialBlock>,
    pending: VecDeque<Frame>,
    timeouts: Timeouts,
    accept_bare_close: bool,
}

impl Conn {
    /// Wrap a transport
    pub fn new(session: Box<dyn SessionOps>, role: Role, timeouts: Timeouts) -> Self {
        Conn {
            channel: FrameChannel::new(session),
            role,
            state: ConnState::New,
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(),
            decoder_failed: false,
            settings: default_settings(),
            peer_settings: Settings::default(),
            last_stream_id: 0,
            partial: None,
            pending: VecDeque::new(),
            timeouts,
            accept_bare_close: false,
        }
    }

    /// Connect to a server under test at `addr`
    ///
    /// The handshake is not performed; call [`Conn::handshake`].
    pub fn dial(addr: SocketAddr, tls: Option<&TlsConfig>, timeouts: Timeouts) -> Result<Self> {
        let tcp = TcpStream::connect_timeout(&addr, timeouts.handshake)?;
        tcp.set_nodelay(true)?;
        debug!("connected to {}", addr);

        Self::wrap(tcp, tls, Role::Client, timeouts)
    }

    /// Take over an accepted socket
    pub fn accept(tcp: TcpStream, tls: Option<&TlsConfig>, timeouts: Timeouts) -> Result<Self> {
        tcp.set_nodelay(true)?;
        Self::wrap(tcp, tls, Role::Server, timeouts)
    }

    fn wrap(tcp: TcpStream, tls: Option<&TlsConfig>, role: Role, timeouts: Timeouts) -> Result<Self> {
        let session: Box<dyn SessionOps> = match (tls, role) {
            (Some(tls), Role::Client) => Box::new(TlsSessionOps::connect(tcp, tls, timeouts.handshake)?),
            (Some(tls), Role::Server) => Box::new(TlsSessionOps::accept(tcp, tls, timeouts.handshake)?),
            (None, _) => Box::new(FdSessionOps::new(tcp)),
        };
        Ok(Conn::new(session, role, timeouts))
    }

    /// Our role on this connection
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Whether the connection is closed, by us or by the peer
    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed || self.channel.is_closed()
    }

    /// Highest stream ID used on this connection
    pub fn last_stream_id(&self) -> u32 {
        self.last_stream_id
    }

    /// SETTINGS announced by the peer
    pub fn peer_settings(&self) -> &Settings {
        &self.peer_settings
    }

    /// Timeouts in effect
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.channel.peer_addr()
    }

    /// Whether a bare close counts as the expected connection error
    pub fn accepts_bare_close(&self) -> bool {
        self.accept_bare_close
    }

    /// Set the bare close policy for the verifications that follow
    pub fn set_accept_bare_close(&mut self, accept: bool) {
        self.accept_bare_close = accept;
    }

    /// Next unused stream ID we may initiate
    pub fn next_stream_id(&self) -> u32 {
        let parity = match self.role {
            Role::Client => 1,
            Role::Server => 0,
        };
        let mut id = self.last_stream_id + 1;
        if id % 2 != parity {
            id += 1;
        }
        id
    }

    fn note_stream(&mut self, stream_id: u32) {
        self.last_stream_id = self.last_stream_id.max(stream_id & 0x7FFFFFFF);
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConnState::Closed => Err(Error::ConnectionClosed),
            _ => Ok(()),
        }
    }

    /// Perform the connection preface and SETTINGS exchange
    pub fn handshake(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state != ConnState::New {
            return Err(Error::Handshake(format!("handshake attempted in state {}", self.state)));
        }

        self.state = ConnState::Handshaking;
        let deadline = Instant::now() + self.timeouts.handshake;

        let result = match self.role {
            Role::Server => self.handshake_as_server(deadline),
            Role::Client => self.handshake_as_client(deadline),
        };

        match result {
            Ok(()) => {
                self.state = ConnState::Established;
                debug!("handshake complete ({:?} role)", self.role);
                Ok(())
            }
            Err(e) => Err(match e {
                Error::Handshake(_) => e,
                Error::Timeout => Error::Handshake("timed out".to_string()),
                other => Error::Handshake(other.to_string()),
            }),
        }
    }

    fn handshake_as_server(&mut self, deadline: Instant) -> Result<()> {
        let preface = self.channel.read_exact(CONNECTION_PREFACE.len(), remaining(deadline))?;
        if &preface[..] != CONNECTION_PREFACE {
            return Err(Error::Handshake("invalid connection preface".to_string()));
        }

        let first = self.channel.read_frame(remaining(deadline))?;
        if !first.is(FrameType::Settings) || first.flags().is_ack() || first.stream_id() != 0 {
            return Err(Error::Handshake(format!("expected SETTINGS, got {}", first)));
        }
        self.absorb_peer_settings(first.payload())?;

        self.write_settings(self.settings.clone())?;
        self.write_settings_ack()?;

        self.await_settings_ack(deadline)
    }

    fn handshake_as_client(&mut self, deadline: Instant) -> Result<()> {
        self.channel.write_bytes(CONNECTION_PREFACE)?;
        self.write_settings(self.settings.clone())?;

        let first = self.channel.read_frame(remaining(deadline))?;
        if !first.is(FrameType::Settings) || first.flags().is_ack() || first.stream_id() != 0 {
            return Err(Error::Handshake(format!("expected SETTINGS, got {}", first)));
        }
        self.absorb_peer_settings(first.payload())?;
        self.write_settings_ack()?;

        self.await_settings_ack(deadline)
    }

    fn await_settings_ack(&mut self, deadline: Instant) -> Result<()> {
        loop {
            let frame = self.channel.read_frame(remaining(deadline))?;
            if frame.is(FrameType::Settings) {
                if frame.flags().is_ack() {
                    return Ok(());
                }
                self.absorb_peer_settings(frame.payload())?;
                self.write_settings_ack()?;
            } else {
                trace!("queued during handshake: {}", frame);
                self.pending.push_back(frame);
            }
        }
    }

    /// Take over the peer's SETTINGS once they parse and validate
    fn absorb_peer_settings(&mut self, payload: &[u8]) -> Result<()> {
        let settings = Settings::parse(payload)?;
        settings.validate()?;
        self.peer_settings = settings;
        Ok(())
    }

    /// Read the next frame, queued frames first
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Frame> {
        self.ensure_open()?;
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        self.channel.read_frame(timeout)
    }

    /// Read one complete request from a client under test
    ///
    /// Bounded by the handshake timeout. SETTINGS arriving meanwhile are
    /// acknowledged; other connection-level frames are skipped.
    pub fn read_request(&mut self) -> Result<Request> {
        self.ensure_open()?;
        let deadline = Instant::now() + self.timeouts.handshake;
        let mut request: Option<Request> = None;

        loop {
            let frame = self.read_frame(remaining(deadline))?;

            match frame.frame_type() {
                Some(FrameType::Headers) | Some(FrameType::Continuation) => {
                    if frame.is(FrameType::Headers) {
                        if request.is_some() {
                            return Err(Error::Protocol(format!("second HEADERS before END_STREAM: {}", frame)));
                        }
                        check_request_stream(frame.stream_id())?;
                    }

                    if let Some(block) = self.absorb_headers(&frame)? {
                        let req = Request {
                            stream_id: block.stream_id,
                            headers: block.headers,
                            body: Bytes::new(),
                        };
                        if block.end_stream {
                            return Ok(req);
                        }
                        request = Some(req);
                    }
                }
                Some(FrameType::Data) => {
                    let req = match request.as_mut() {
                        Some(req) if req.stream_id == frame.stream_id() => req,
                        _ => return Err(Error::Protocol(format!("DATA without open request: {}", frame))),
                    };

                    let data = DataFrame::data(frame.flags(), frame.payload())?;
                    let mut body = BytesMut::from(&req.body[..]);
                    body.extend_from_slice(&data);
                    req.body = body.freeze();

                    if frame.flags().is_end_stream() {
                        return request.ok_or_else(|| Error::Protocol("request vanished".to_string()));
                    }
                }
                _ => {
                    if self.partial.is_some() {
                        return Err(Error::Protocol(format!("{} interleaved with a header block", frame)));
                    }
                    if frame.is(FrameType::Settings) && !frame.flags().is_ack() {
                        self.absorb_peer_settings(frame.payload())?;
                        self.write_settings_ack()?;
                    }
                }
            }
        }
    }

    /// Feed HEADERS/CONTINUATION through the decoder in arrival order
    ///
    /// Returns the decoded block once END_HEADERS is seen.
    pub(crate) fn absorb_headers(&mut self, frame: &Frame) -> Result<Option<HeaderBlock>> {
        let flags = frame.flags();

        let part = match frame.frame_type() {
            Some(FrameType::Headers) => {
                if let Some(open) = &self.partial {
                    return Err(Error::Protocol(format!(
                        "HEADERS on stream {} while header block for stream {} is open",
                        frame.stream_id(),
                        open.stream_id
                    )));
                }
                self.note_stream(frame.stream_id());
                let fragment = HeadersFrame::fragment(flags, frame.payload())?;
                PartialBlock {
                    stream_id: frame.stream_id(),
                    end_stream: flags.is_end_stream(),
                    block: BytesMut::from(&fragment[..]),
                }
            }
            Some(FrameType::Continuation) => match self.partial.take() {
                Some(mut open) if open.stream_id == frame.stream_id() => {
                    open.block.extend_from_slice(frame.payload());
                    open
                }
                Some(open) => {
                    return Err(Error::Protocol(format!(
                        "CONTINUATION on stream {} while header block for stream {} is open",
                        frame.stream_id(),
                        open.stream_id
                    )))
                }
                None => {
                    return Err(Error::Protocol(format!("CONTINUATION without HEADERS: {}", frame)));
                }
            },
            _ => return Ok(None),
        };

        if !flags.is_end_headers() {
            self.partial = Some(part);
            return Ok(None);
        }

        let headers = self.decode_headers(&part.block)?;
        Ok(Some(HeaderBlock {
            stream_id: part.stream_id,
            end_stream: part.end_stream,
            headers,
        }))
    }

    /// Encode a header list through the outgoing HPACK context
    pub fn encode_headers(&mut self, headers: &[(String, String)]) -> Bytes {
        let block = self
            .encoder
            .encode(headers.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));
        Bytes::from(block)
    }

    /// Decode a header block through the incoming HPACK context
    ///
    /// A block that makes the decoder panic leaves the context unusable, so
    /// every later block on this connection fails too.
    pub fn decode_headers(&mut self, block: &[u8]) -> Result<Vec<(String, String)>> {
        if self.decoder_failed {
            return Err(Error::Compression("HPACK context lost to an earlier malformed block".to_string()));
        }

        let decoder = &mut self.decoder;
        let decoded = match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(block))) {
            Ok(result) => result.map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?,
            Err(_) => {
                self.decoder_failed = true;
                return Err(Error::Compression(format!("HPACK decoder panicked on a {}-octet block", block.len())));
            }
        };

        Ok(decoded
            .into_iter()
            .map(|(n, v)| {
                (
                    String::from_utf8_lossy(&n).into_owned(),
                    String::from_utf8_lossy(&v).into_owned(),
                )
            })
            .collect())
    }

    fn send(&mut self, encoded: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.channel.write_frame(encoded)
    }

    /// Encode `headers` and send them as one HEADERS frame
    pub fn write_headers(&mut self, stream_id: u32, headers: &[(String, String)], end_stream: bool) -> Result<()> {
        let block = self.encode_headers(headers);
        self.note_stream(stream_id);
        let frame = HeadersFrame::new(stream_id, block, end_stream, true);
        self.send(&FrameCodec::encode_headers_frame(&frame))
    }

    /// Send a prepared HEADERS frame
    pub fn write_headers_frame(&mut self, frame: &HeadersFrame) -> Result<()> {
        self.note_stream(frame.stream_id);
        self.send(&FrameCodec::encode_headers_frame(frame))
    }

    /// Send a CONTINUATION frame
    pub fn write_continuation(&mut self, stream_id: u32, end_headers: bool, block: Bytes) -> Result<()> {
        let frame = ContinuationFrame {
            stream_id,
            header_block: block,
            end_headers,
        };
        self.send(&FrameCodec::encode_continuation_frame(&frame))
    }

    /// Send a DATA frame
    pub fn write_data(&mut self, stream_id: u32, end_stream: bool, data: Bytes) -> Result<()> {
        let frame = DataFrame::new(stream_id, data, end_stream);
        self.send(&FrameCodec::encode_data_frame(&frame))
    }

    /// Send a SETTINGS frame
    pub fn write_settings(&mut self, settings: Settings) -> Result<()> {
        self.send(&FrameCodec::encode_settings_frame(&SettingsFrame::new(settings)))
    }

    /// Acknowledge the peer's SETTINGS
    pub fn write_settings_ack(&mut self) -> Result<()> {
        self.send(&FrameCodec::encode_settings_frame(&SettingsFrame::ack()))
    }

    /// Send a PING frame
    pub fn write_ping(&mut self, ack: bool, data: [u8; 8]) -> Result<()> {
        let frame = if ack { PingFrame::ack(data) } else { PingFrame::new(data) };
        self.send(&FrameCodec::encode_ping_frame(&frame))
    }

    /// Send a PRIORITY frame
    pub fn write_priority(&mut self, stream_id: u32, priority: PrioritySpec) -> Result<()> {
        let frame = PriorityFrame { stream_id, priority };
        self.send(&FrameCodec::encode_priority_frame(&frame))
    }

    /// Send a WINDOW_UPDATE frame
    pub fn write_window_update(&mut self, stream_id: u32, increment: u32) -> Result<()> {
        let frame = WindowUpdateFrame::new(stream_id, increment);
        self.send(&FrameCodec::encode_window_update_frame(&frame))
    }

    /// Send a RST_STREAM frame
    pub fn write_rst_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<()> {
        self.send(&FrameCodec::encode_rst_stream_frame(&RstStreamFrame::new(stream_id, code)))
    }

    /// Send a GOAWAY frame
    pub fn write_goaway(&mut self, last_stream_id: u32, code: ErrorCode, debug_data: Bytes) -> Result<()> {
        let frame = GoawayFrame::new(last_stream_id, code, debug_data);
        self.send(&FrameCodec::encode_goaway_frame(&frame))
    }

    /// Send a frame with every header field taken verbatim
    pub fn write_raw_frame(&mut self, frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.channel.write_raw(frame_type, flags, stream_id, payload)
    }

    /// Send a frame whose length field disagrees with its payload
    pub fn write_raw_frame_with_len(
        &mut self,
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        length: u32,
        payload: &[u8],
    ) -> Result<()> {
        self.ensure_open()?;
        self.channel
            .write_raw_with_len(frame_type, flags, stream_id, length, payload)
    }

    /// Send arbitrary octets
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.channel.write_bytes(data)
    }

    /// Run the closing sequence
    ///
    /// Sends GOAWAY(NO_ERROR) unless the peer already closed, waits the
    /// grace period, then closes the transport. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnState::Closed {
            return Ok(());
        }
        self.state = ConnState::Closing;

        if !self.channel.is_closed() {
            let goaway = GoawayFrame::new(self.last_stream_id, ErrorCode::NoError, Bytes::new());
            match self.channel.write_frame(&FrameCodec::encode_goaway_frame(&goaway)) {
                Ok(()) => thread::sleep(self.timeouts.close_grace),
                Err(e) => debug!("closing GOAWAY not sent: {}", e),
            }
        }

        self.state = ConnState::Closed;
        self.channel.close()
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn check_request_stream(stream_id: u32) -> Result<()> {
    if stream_id == 0 {
        return Err(Error::Protocol("HEADERS on stream 0".to_string()));
    }
    if stream_id % 2 == 0 {
        return Err(Error::Protocol(format!(
            "HEADERS on server-initiated stream {}",
            stream_id
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::net::TcpListener;

    /// A connected plain-TCP pair: (server-role Conn, client-role Conn)
    pub(crate) fn conn_pair(timeouts: Timeouts) -> (Conn, Conn) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        (
            Conn::accept(server, None, timeouts).unwrap(),
            Conn::new(Box::new(FdSessionOps::new(client)), Role::Client, timeouts),
        )
    }

    pub(crate) fn quick_timeouts() -> Timeouts {
        Timeouts {
            handshake: Duration::from_secs(2),
            read: Duration::from_millis(100),
            verify: Duration::from_millis(500),
            close_grace: Duration::from_millis(10),
        }
    }

    /// Handshake both ends on separate threads
    pub(crate) fn established_pair() -> (Conn, Conn) {
        let (mut server, mut client) = conn_pair(quick_timeouts());
        let handle = thread::spawn(move || {
            client.handshake().unwrap();
            client
        });
        server.handshake().unwrap();
        let client = handle.join().unwrap();
        (server, client)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_handshake_both_roles() {
        let (server, client) = established_pair();
        assert_eq!(server.state(), ConnState::Established);
        assert_eq!(client.state(), ConnState::Established);
        assert_eq!(client.peer_settings().max_concurrent_streams, Some(100));
        assert_eq!(server.peer_settings().initial_window_size, Some(65535));
    }

    #[test]
    fn test_handshake_rejects_bad_preface() {
        let (mut server, mut client) = conn_pair(quick_timeouts());
        client.write_bytes(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

        let result = server.handshake();
        assert!(matches!(result, Err(Error::Handshake(_))));
    }

    #[test]
    fn test_handshake_times_out_on_silent_peer() {
        let mut timeouts = quick_timeouts();
        timeouts.handshake = Duration::from_millis(200);
        let (mut server, _client) = conn_pair(timeouts);

        let start = Instant::now();
        assert!(matches!(server.handshake(), Err(Error::Handshake(_))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_handshake_rejects_invalid_peer_settings() {
        let (mut server, mut client) = conn_pair(quick_timeouts());
        client.write_bytes(CONNECTION_PREFACE).unwrap();
        // MAX_FRAME_SIZE = 1024 is below the protocol floor
        client
            .write_raw_frame(FrameType::Settings.as_u8(), 0, 0, &[0x00, 0x05, 0x00, 0x00, 0x04, 0x00])
            .unwrap();

        match server.handshake() {
            Err(Error::Handshake(reason)) => assert!(reason.contains("Max frame size"), "{}", reason),
            other => panic!("expected handshake failure, got {:?}", other.map(|_| ())),
        }
        assert_eq!(server.peer_settings(), &Settings::default());
    }

    #[test]
    fn test_read_request_with_continuation_and_body() {
        let (mut server, mut client) = established_pair();

        let block = client.encode_headers(&headers(&[
            (":method", "POST"),
            (":scheme", "http"),
            (":path", "/upload"),
            (":authority", "localhost"),
        ]));
        let (first, rest) = block.split_at(block.len() / 2);

        let frame = HeadersFrame::new(1, Bytes::copy_from_slice(first), false, false);
        client.write_headers_frame(&frame).unwrap();
        client
            .write_continuation(1, true, Bytes::copy_from_slice(rest))
            .unwrap();
        client.write_data(1, false, Bytes::from_static(b"hello ")).unwrap();
        client.write_data(1, true, Bytes::from_static(b"world")).unwrap();

        let request = server.read_request().unwrap();
        assert_eq!(request.stream_id, 1);
        assert_eq!(request.header(":method"), Some("POST"));
        assert_eq!(request.header(":path"), Some("/upload"));
        assert_eq!(&request.body[..], b"hello world");
        assert_eq!(server.last_stream_id(), 1);
    }

    #[test]
    fn test_read_request_rejects_even_stream() {
        let (mut server, mut client) = established_pair();
        client
            .write_headers(2, &headers(&[(":method", "GET")]), true)
            .unwrap();

        assert!(matches!(server.read_request(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_read_request_rejects_orphan_data() {
        let (mut server, mut client) = established_pair();
        client.write_data(1, true, Bytes::from_static(b"x")).unwrap();

        assert!(matches!(server.read_request(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_hpack_contexts_stay_in_sync() {
        let (mut server, mut client) = established_pair();
        let fields = headers(&[(":method", "GET"), ("x-custom", "value")]);

        for stream_id in [1, 3, 5] {
            client.write_headers(stream_id, &fields, true).unwrap();
            let request = server.read_request().unwrap();
            assert_eq!(request.stream_id, stream_id);
            assert_eq!(request.header("x-custom"), Some("value"));
        }
        assert_eq!(client.next_stream_id(), 7);
        assert_eq!(server.next_stream_id(), 6);
    }

    #[test]
    fn test_truncated_size_update_poisons_decoder() {
        let (mut server, _client) = conn_pair(quick_timeouts());

        // Dynamic table size update whose integer needs more octets
        match server.decode_headers(&[0x3f]) {
            Err(Error::Compression(reason)) => assert!(reason.contains("panicked"), "{}", reason),
            other => panic!("expected compression error, got {:?}", other),
        }

        // Indexed :method GET, valid on a fresh context
        assert!(matches!(server.decode_headers(&[0x82]), Err(Error::Compression(_))));
    }

    #[test]
    fn test_decode_error_keeps_decoder() {
        let (mut server, _client) = conn_pair(quick_timeouts());

        assert!(matches!(server.decode_headers(&[0xff, 0x7f]), Err(Error::Compression(_))));
        let fields = server.decode_headers(&[0x82]).unwrap();
        assert_eq!(fields, headers(&[(":method", "GET")]));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut server, mut client) = established_pair();
        client.write_headers(3, &headers(&[(":method", "GET")]), true).unwrap();
        server.read_request().unwrap();

        server.close().unwrap();
        assert_eq!(server.state(), ConnState::Closed);
        server.close().unwrap();
        assert!(matches!(server.write_ping(false, [0; 8]), Err(Error::ConnectionClosed)));
        assert!(matches!(server.read_frame(Duration::from_millis(10)), Err(Error::ConnectionClosed)));

        let goaway = client.read_frame(Duration::from_secs(1)).unwrap();
        let goaway = GoawayFrame::parse(&goaway).unwrap();
        assert_eq!(goaway.last_stream_id, 3);
        assert_eq!(goaway.error_code(), Some(ErrorCode::NoError));
    }

    #[test]
    fn test_common_headers() {
        let config = Config::builder()
            .host("example.com")
            .port(443)
            .tls(true)
            .path("/index.html")
            .build()
            .unwrap();
        let request = Request {
            headers: common_headers(&config),
            ..Request::default()
        };
        assert_eq!(request.header(":scheme"), Some("https"));
        assert_eq!(request.header(":authority"), Some("example.com:443"));
        assert_eq!(request.header(":path"), Some("/index.html"));
        assert_eq!(common_resp_headers()[0].1, "200");
    }
}
