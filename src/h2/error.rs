//! HTTP/2 error types
//!
//! This module defines the engine's error taxonomy and the error codes
//! defined in RFC 7540 Section 7.

use super::frames::FrameType;
use std::fmt;
use std::time::Duration;

/// Conformance engine errors
///
/// Every per-connection failure is one of these. Drivers convert them into a
/// failed outcome; only configuration-level variants escape to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake error
    #[error("TLS error: {0}")]
    Tls(#[from] crate::tls::TlsError),

    /// Connection preface or initial SETTINGS exchange failed
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Unexpected frame or ordering while reading a request
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HPACK encode/decode failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// A single read did not complete in time
    #[error("Timeout")]
    Timeout,

    /// No error signal observed within the verification bound
    #[error("No response: timed out after {waited:?} waiting for {wanted} (last frame: {})", last_frame.as_deref().unwrap_or("none"))]
    VerificationTimeout {
        /// How long the verification waited
        waited: Duration,
        /// What the verification was waiting for
        wanted: &'static str,
        /// Last frame drained while waiting
        last_frame: Option<String>,
    },

    /// Peer signaled an error, but not the required one
    #[error("Expected {} with {expected}, got {}", frame.name(), describe_code(*actual))]
    UnexpectedErrorCode {
        /// Frame that carried the error code
        frame: FrameType,
        /// Error code required by the test case
        expected: ErrorCode,
        /// Raw error code observed on the wire
        actual: u32,
    },

    /// Peer closed the connection without sending GOAWAY
    #[error("Connection closed without GOAWAY (expected {expected})")]
    UnexpectedClose {
        /// Error code required by the test case
        expected: ErrorCode,
    },

    /// Connection already closed (by us or by the peer)
    #[error("Connection closed")]
    ConnectionClosed,

    /// Listener bind or accept failure
    #[error("Listener error on {addr}: {source}")]
    Listener {
        /// Address the listener was bound to
        addr: String,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// A case body panicked
    #[error("Case panicked: {0}")]
    Panicked(String),
}

/// HTTP/2 error codes as defined in RFC 7540 Section 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame size incorrect
    FrameSizeError = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
    /// Negotiated TLS parameters not acceptable
    InadequateSecurity = 0xc,
    /// Use HTTP/1.1 for the request
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            0xd => Some(ErrorCode::Http11Required),
            _ => None,
        }
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Describe a raw wire error code, including codes outside RFC 7540
pub fn describe_code(code: u32) -> String {
    match ErrorCode::from_u32(code) {
        Some(known) => known.to_string(),
        None => format!("UNKNOWN (0x{:x})", code),
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;
