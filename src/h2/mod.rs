//! HTTP/2 wire layer
//!
//! Frame types, the frame codec, SETTINGS handling and the error taxonomy.
//!
//! The codec offers two write paths. Typed encoders (`encode_*_frame`)
//! produce frames a conformant peer would send. The raw path
//! (`encode_raw_frame*`) writes header fields verbatim so test cases can
//! construct frames that violate RFC 7540 on purpose.
//!
//! # Examples
//!
//! ```
//! use h2conform::h2::codec::FrameCodec;
//! use h2conform::h2::frames::FrameType;
//!
//! // RST_STREAM on stream 0 with a 3-octet payload
//! let wire = FrameCodec::encode_raw_frame(FrameType::RstStream.as_u8(), 0, 0, b"\x00\x00\x00");
//! assert_eq!(&wire[..9], &[0, 0, 3, 3, 0, 0, 0, 0, 0]);
//! ```

pub mod codec;
pub mod error;
pub mod frames;
pub mod settings;

pub use codec::{FrameCodec, FRAME_HEADER_SIZE};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameFlags, FrameType};
pub use settings::Settings;

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
