//! HTTP/2 frame types and utilities
//!
//! This module defines the frame types specified in RFC 7540 Section 6,
//! plus a received-frame view that keeps the header bytes exactly as they
//! arrived on the wire.

use super::codec::FRAME_HEADER_SIZE;
use super::error::{Error, ErrorCode, Result};
use super::settings::Settings;
use bytes::Bytes;
use std::fmt;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// DATA frame (0x0) - Conveys arbitrary, variable-length sequences of octets
    Data = 0x0,
    /// HEADERS frame (0x1) - Opens a stream and carries header block fragment
    Headers = 0x1,
    /// PRIORITY frame (0x2) - Specifies sender-advised priority of a stream
    Priority = 0x2,
    /// RST_STREAM frame (0x3) - Allows immediate termination of a stream
    RstStream = 0x3,
    /// SETTINGS frame (0x4) - Conveys configuration parameters
    Settings = 0x4,
    /// PUSH_PROMISE frame (0x5) - Used to notify peer of intent to initiate stream
    PushPromise = 0x5,
    /// PING frame (0x6) - Mechanism for measuring round-trip time
    Ping = 0x6,
    /// GOAWAY frame (0x7) - Initiates shutdown of connection
    Goaway = 0x7,
    /// WINDOW_UPDATE frame (0x8) - Implements flow control
    WindowUpdate = 0x8,
    /// CONTINUATION frame (0x9) - Continues sequence of header block fragments
    Continuation = 0x9,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Check if a flag is set
    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    // Common flags

    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    /// Check if END_STREAM is set
    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    /// Check if ACK is set
    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    /// Check if END_HEADERS is set
    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    /// Check if PADDED is set
    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    /// Check if PRIORITY is set
    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// A frame as received from the wire
///
/// The nine header octets are kept verbatim, so a malformed header
/// (reserved bit set, unknown type, odd length) is observable as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: [u8; FRAME_HEADER_SIZE],
    payload: Bytes,
}

impl Frame {
    /// Create a frame from its raw header and payload
    pub fn from_parts(header: [u8; FRAME_HEADER_SIZE], payload: Bytes) -> Self {
        Frame { header, payload }
    }

    /// Raw header octets
    pub fn raw_header(&self) -> &[u8; FRAME_HEADER_SIZE] {
        &self.header
    }

    /// Length field from the header
    pub fn length(&self) -> usize {
        ((self.header[0] as usize) << 16) | ((self.header[1] as usize) << 8) | (self.header[2] as usize)
    }

    /// Raw frame type octet
    pub fn type_byte(&self) -> u8 {
        self.header[3]
    }

    /// Frame type, `None` for extension/unknown types
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.header[3])
    }

    /// Check the frame type
    pub fn is(&self, frame_type: FrameType) -> bool {
        self.header[3] == frame_type.as_u8()
    }

    /// Frame flags
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_u8(self.header[4])
    }

    /// Stream ID with the reserved bit masked off
    pub fn stream_id(&self) -> u32 {
        u32::from_be_bytes([self.header[5], self.header[6], self.header[7], self.header[8]]) & 0x7FFFFFFF
    }

    /// Whether the reserved bit of the stream ID field is set
    pub fn reserved_bit(&self) -> bool {
        self.header[5] & 0x80 != 0
    }

    /// Frame payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Get payload size
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.frame_type() {
            Some(t) => write!(f, "{}", t.name())?,
            None => write!(f, "UNKNOWN(0x{:x})", self.type_byte())?,
        }
        write!(
            f,
            " stream={} flags=0x{:x} len={}",
            self.stream_id(),
            self.flags().as_u8(),
            self.length()
        )
    }
}

/// DATA frame (RFC 7540 Section 6.1)
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Data payload
    pub data: Bytes,
    /// END_STREAM flag
    pub end_stream: bool,
    /// Padding length (if PADDED flag is set)
    pub padding: Option<u8>,
}

impl DataFrame {
    /// Create a new DATA frame
    pub fn new(stream_id: u32, data: Bytes, end_stream: bool) -> Self {
        DataFrame {
            stream_id,
            data,
            end_stream,
            padding: None,
        }
    }

    /// Set padding
    pub fn with_padding(mut self, padding: u8) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Extract application data from a received DATA payload
    pub fn data(flags: FrameFlags, payload: &Bytes) -> Result<Bytes> {
        if !flags.is_padded() {
            return Ok(payload.clone());
        }

        let pad_len = *payload
            .first()
            .ok_or_else(|| Error::Protocol("PADDED DATA frame without pad length".to_string()))?
            as usize;
        if pad_len >= payload.len() {
            return Err(Error::Protocol(format!("DATA pad length {} exceeds payload", pad_len)));
        }

        Ok(payload.slice(1..payload.len() - pad_len))
    }
}

/// HEADERS frame (RFC 7540 Section 6.2)
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Header block fragment
    pub header_block: Bytes,
    /// END_STREAM flag
    pub end_stream: bool,
    /// END_HEADERS flag
    pub end_headers: bool,
    /// Priority information (if PRIORITY flag is set)
    pub priority: Option<PrioritySpec>,
    /// Padding length (if PADDED flag is set)
    pub padding: Option<u8>,
}

impl HeadersFrame {
    /// Create a new HEADERS frame
    pub fn new(stream_id: u32, header_block: Bytes, end_stream: bool, end_headers: bool) -> Self {
        HeadersFrame {
            stream_id,
            header_block,
            end_stream,
            end_headers,
            priority: None,
            padding: None,
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: PrioritySpec) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set padding
    pub fn with_padding(mut self, padding: u8) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Extract the header block fragment from a received HEADERS payload,
    /// stripping padding and priority fields according to `flags`
    pub fn fragment(flags: FrameFlags, payload: &Bytes) -> Result<Bytes> {
        let mut start = 0;
        let mut end = payload.len();

        if flags.is_padded() {
            let pad_len = *payload
                .first()
                .ok_or_else(|| Error::Protocol("PADDED HEADERS frame without pad length".to_string()))?
                as usize;
            start += 1;
            if pad_len > end - start {
                return Err(Error::Protocol(format!(
                    "HEADERS pad length {} exceeds payload",
                    pad_len
                )));
            }
            end -= pad_len;
        }

        if flags.is_priority() {
            start += 5;
        }

        if start > end {
            return Err(Error::Protocol("HEADERS frame too short".to_string()));
        }

        Ok(payload.slice(start..end))
    }
}

/// Priority specification (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy)]
pub struct PrioritySpec {
    /// Stream dependency
    pub stream_dependency: u32,
    /// Exclusive flag
    pub exclusive: bool,
    /// Weight (1-256)
    pub weight: u8,
}

impl PrioritySpec {
    /// Create a new priority specification
    pub fn new(stream_dependency: u32, exclusive: bool, weight: u8) -> Self {
        PrioritySpec {
            stream_dependency,
            exclusive,
            weight,
        }
    }
}

/// PRIORITY frame (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy)]
pub struct PriorityFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Priority specification
    pub priority: PrioritySpec,
}

/// RST_STREAM frame (RFC 7540 Section 6.4)
#[derive(Debug, Clone, Copy)]
pub struct RstStreamFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Raw error code
    pub code: u32,
}

impl RstStreamFrame {
    /// Create a new RST_STREAM frame
    pub fn new(stream_id: u32, error_code: ErrorCode) -> Self {
        RstStreamFrame {
            stream_id,
            code: error_code.as_u32(),
        }
    }

    /// Parse a received RST_STREAM frame
    pub fn parse(frame: &Frame) -> Result<Self> {
        let payload = frame.payload();
        if payload.len() != 4 {
            return Err(Error::Protocol(format!(
                "RST_STREAM payload must be 4 octets, got {}",
                payload.len()
            )));
        }
        Ok(RstStreamFrame {
            stream_id: frame.stream_id(),
            code: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
        })
    }

    /// Error code, if it is one defined by RFC 7540
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u32(self.code)
    }
}

/// SETTINGS frame (RFC 7540 Section 6.5)
#[derive(Debug, Clone)]
pub struct SettingsFrame {
    /// ACK flag
    pub ack: bool,
    /// Settings parameters
    pub settings: Settings,
}

impl SettingsFrame {
    /// Create a new SETTINGS frame
    pub fn new(settings: Settings) -> Self {
        SettingsFrame {
            ack: false,
            settings,
        }
    }

    /// Create a SETTINGS ACK frame
    pub fn ack() -> Self {
        SettingsFrame {
            ack: true,
            settings: Settings::default(),
        }
    }
}

/// PING frame (RFC 7540 Section 6.7)
#[derive(Debug, Clone, Copy)]
pub struct PingFrame {
    /// ACK flag
    pub ack: bool,
    /// Opaque data (8 bytes)
    pub data: [u8; 8],
}

impl PingFrame {
    /// Create a new PING frame
    pub fn new(data: [u8; 8]) -> Self {
        PingFrame { ack: false, data }
    }

    /// Create a PING ACK frame
    pub fn ack(data: [u8; 8]) -> Self {
        PingFrame { ack: true, data }
    }

    /// Parse a received PING frame
    pub fn parse(frame: &Frame) -> Result<Self> {
        let payload = frame.payload();
        if payload.len() != 8 {
            return Err(Error::Protocol(format!(
                "PING payload must be 8 octets, got {}",
                payload.len()
            )));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(payload);
        Ok(PingFrame {
            ack: frame.flags().is_ack(),
            data,
        })
    }
}

/// GOAWAY frame (RFC 7540 Section 6.8)
#[derive(Debug, Clone)]
pub struct GoawayFrame {
    /// Last stream ID
    pub last_stream_id: u32,
    /// Raw error code
    pub code: u32,
    /// Debug data
    pub debug_data: Bytes,
}

impl GoawayFrame {
    /// Create a new GOAWAY frame
    pub fn new(last_stream_id: u32, error_code: ErrorCode, debug_data: Bytes) -> Self {
        GoawayFrame {
            last_stream_id,
            code: error_code.as_u32(),
            debug_data,
        }
    }

    /// Parse a received GOAWAY frame
    pub fn parse(frame: &Frame) -> Result<Self> {
        let payload = frame.payload();
        if payload.len() < 8 {
            return Err(Error::Protocol(format!(
                "GOAWAY payload must be at least 8 octets, got {}",
                payload.len()
            )));
        }
        Ok(GoawayFrame {
            last_stream_id: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                & 0x7FFFFFFF,
            code: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
            debug_data: payload.slice(8..),
        })
    }

    /// Error code, if it is one defined by RFC 7540
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u32(self.code)
    }
}

/// WINDOW_UPDATE frame (RFC 7540 Section 6.9)
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdateFrame {
    /// Stream ID (0 for connection-level)
    pub stream_id: u32,
    /// Window size increment
    pub size_increment: u32,
}

impl WindowUpdateFrame {
    /// Create a new WINDOW_UPDATE frame
    pub fn new(stream_id: u32, size_increment: u32) -> Self {
        WindowUpdateFrame {
            stream_id,
            size_increment,
        }
    }
}

/// CONTINUATION frame (RFC 7540 Section 6.10)
#[derive(Debug, Clone)]
pub struct ContinuationFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Header block fragment
    pub header_block: Bytes,
    /// END_HEADERS flag
    pub end_headers: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(header: [u8; 9], payload: &'static [u8]) -> Frame {
        Frame::from_parts(header, Bytes::from_static(payload))
    }

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::Data.as_u8(), 0x0);
        assert_eq!(FrameType::Headers.as_u8(), 0x1);
        assert_eq!(FrameType::Continuation.as_u8(), 0x9);

        assert_eq!(FrameType::from_u8(0x0), Some(FrameType::Data));
        assert_eq!(FrameType::from_u8(0x9), Some(FrameType::Continuation));
        assert_eq!(FrameType::from_u8(0xff), None);
    }

    #[test]
    fn test_frame_flags() {
        let mut flags = FrameFlags::empty();
        assert!(!flags.is_end_stream());

        flags.set(FrameFlags::END_STREAM);
        assert!(flags.is_end_stream());
        assert!(!flags.is_end_headers());

        flags.set(FrameFlags::END_HEADERS);
        assert!(flags.is_end_stream());
        assert!(flags.is_end_headers());
    }

    #[test]
    fn test_received_frame_view() {
        let f = frame([0, 0, 4, 0x3, 0x0, 0x80, 0, 0, 1], b"\x00\x00\x00\x08");
        assert_eq!(f.length(), 4);
        assert!(f.is(FrameType::RstStream));
        assert_eq!(f.stream_id(), 1);
        assert!(f.reserved_bit());
        assert_eq!(f.to_string(), "RST_STREAM stream=1 flags=0x0 len=4");
    }

    #[test]
    fn test_unknown_frame_type_preserved() {
        let f = frame([0, 0, 0, 0xfe, 0x0, 0, 0, 0, 0], b"");
        assert_eq!(f.frame_type(), None);
        assert_eq!(f.type_byte(), 0xfe);
        assert_eq!(f.to_string(), "UNKNOWN(0xfe) stream=0 flags=0x0 len=0");
    }

    #[test]
    fn test_goaway_parse() {
        let f = frame(
            [0, 0, 10, 0x7, 0, 0, 0, 0, 0],
            b"\x00\x00\x00\x03\x00\x00\x00\x01hi",
        );
        let goaway = GoawayFrame::parse(&f).unwrap();
        assert_eq!(goaway.last_stream_id, 3);
        assert_eq!(goaway.error_code(), Some(ErrorCode::ProtocolError));
        assert_eq!(&goaway.debug_data[..], b"hi");

        let short = frame([0, 0, 4, 0x7, 0, 0, 0, 0, 0], b"\x00\x00\x00\x03");
        assert!(GoawayFrame::parse(&short).is_err());
    }

    #[test]
    fn test_rst_stream_parse_keeps_unknown_code() {
        let f = frame([0, 0, 4, 0x3, 0, 0, 0, 0, 5], b"\x00\x00\xbe\xef");
        let rst = RstStreamFrame::parse(&f).unwrap();
        assert_eq!(rst.stream_id, 5);
        assert_eq!(rst.code, 0xbeef);
        assert_eq!(rst.error_code(), None);
    }

    #[test]
    fn test_headers_fragment_strips_padding_and_priority() {
        let flags = FrameFlags::from_u8(FrameFlags::PADDED | FrameFlags::PRIORITY | FrameFlags::END_HEADERS);
        // pad length 2, priority (5 octets), fragment "abc", padding
        let payload = Bytes::from_static(b"\x02\x00\x00\x00\x00\x0fabc\x00\x00");
        let fragment = HeadersFrame::fragment(flags, &payload).unwrap();
        assert_eq!(&fragment[..], b"abc");

        let bad = Bytes::from_static(b"\x09abc");
        assert!(HeadersFrame::fragment(FrameFlags::from_u8(FrameFlags::PADDED), &bad).is_err());
    }

    #[test]
    fn test_data_strips_padding() {
        let flags = FrameFlags::from_u8(FrameFlags::PADDED);
        let payload = Bytes::from_static(b"\x03body\x00\x00\x00");
        assert_eq!(&DataFrame::data(flags, &payload).unwrap()[..], b"body");

        let plain = Bytes::from_static(b"\x03body");
        assert_eq!(DataFrame::data(FrameFlags::empty(), &plain).unwrap(), plain);

        assert!(DataFrame::data(flags, &Bytes::from_static(b"\x05ab")).is_err());
    }

    #[test]
    fn test_ping_parse() {
        let f = frame([0, 0, 8, 0x6, 0x1, 0, 0, 0, 0], b"12345678");
        let ping = PingFrame::parse(&f).unwrap();
        assert!(ping.ack);
        assert_eq!(&ping.data, b"12345678");
    }
}
