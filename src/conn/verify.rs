//! Verification primitives
//!
//! Each primitive reads frames with the per-read timeout until it sees the
//! frame it is looking for, the connection closes, or the overall
//! verification timeout elapses. Unrelated frames are drained. PINGs are
//! never answered.

use super::{Conn, HeaderBlock};
use crate::h2::frames::{Frame, FrameType, GoawayFrame, PingFrame, RstStreamFrame};
use crate::h2::{Error, ErrorCode, Result};
use log::debug;
use std::time::Instant;

/// Verdict of the frame callback
enum Step<T> {
    Done(T),
    Continue,
}

/// How a wait ended without an error
enum Waited<T> {
    Matched(T),
    Closed,
}

impl Conn {
    /// Expect a connection error carrying `expected`
    ///
    /// Passes on GOAWAY with `expected`. A bare close passes only when the
    /// connection accepts bare closes.
    pub fn verify_connection_error(&mut self, expected: ErrorCode) -> Result<()> {
        let waited = self.wait_for("GOAWAY", |frame, _| {
            if !frame.is(FrameType::Goaway) {
                return Ok(Step::Continue);
            }
            let goaway = GoawayFrame::parse(frame)?;
            check_code(FrameType::Goaway, expected, goaway.code).map(Step::Done)
        })?;

        self.closed_or(waited, expected)
    }

    /// Expect a stream error on `stream_id` carrying `expected`
    ///
    /// RST_STREAM on `stream_id` or a GOAWAY (escalation to a connection
    /// error) are both pertinent; the first one decides.
    pub fn verify_stream_error(&mut self, stream_id: u32, expected: ErrorCode) -> Result<()> {
        let waited = self.wait_for("GOAWAY or RST_STREAM", |frame, _| match frame.frame_type() {
            Some(FrameType::Goaway) => {
                let goaway = GoawayFrame::parse(frame)?;
                check_code(FrameType::Goaway, expected, goaway.code).map(Step::Done)
            }
            Some(FrameType::RstStream) if frame.stream_id() == stream_id => {
                let rst = RstStreamFrame::parse(frame)?;
                check_code(FrameType::RstStream, expected, rst.code).map(Step::Done)
            }
            _ => Ok(Step::Continue),
        })?;

        self.closed_or(waited, expected)
    }

    /// Expect a HEADERS block on `stream_id`, returning its decoded fields
    pub fn verify_headers_frame(&mut self, stream_id: u32) -> Result<Vec<(String, String)>> {
        let waited = self.wait_for("HEADERS", |_, block| match block {
            Some(block) if block.stream_id == stream_id => Ok(Step::Done(block.headers.clone())),
            _ => Ok(Step::Continue),
        })?;

        match waited {
            Waited::Matched(headers) => Ok(headers),
            Waited::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Expect a PING ACK echoing `data`
    pub fn verify_ping_ack(&mut self, data: [u8; 8]) -> Result<()> {
        let waited = self.wait_for("PING ACK", |frame, _| {
            if !frame.is(FrameType::Ping) {
                return Ok(Step::Continue);
            }
            let ping = PingFrame::parse(frame)?;
            if !ping.ack {
                return Ok(Step::Continue);
            }
            if ping.data != data {
                return Err(Error::Protocol(format!(
                    "PING ACK payload {:02x?} does not match {:02x?}",
                    ping.data, data
                )));
            }
            Ok(Step::Done(()))
        })?;

        match waited {
            Waited::Matched(()) => Ok(()),
            Waited::Closed => Err(Error::ConnectionClosed),
        }
    }

    fn closed_or(&self, waited: Waited<()>, expected: ErrorCode) -> Result<()> {
        match waited {
            Waited::Matched(()) => Ok(()),
            Waited::Closed if self.accept_bare_close => {
                debug!("bare close accepted in place of {}", expected);
                Ok(())
            }
            Waited::Closed => Err(Error::UnexpectedClose { expected }),
        }
    }

    /// Shared polling loop
    ///
    /// Header blocks are decoded before `on_frame` runs, so the HPACK
    /// context advances for every block whether or not it is wanted.
    fn wait_for<T, F>(&mut self, wanted: &'static str, mut on_frame: F) -> Result<Waited<T>>
    where
        F: FnMut(&Frame, Option<&HeaderBlock>) -> Result<Step<T>>,
    {
        self.ensure_open()?;

        let started = Instant::now();
        let deadline = started + self.timeouts.verify;
        let mut last_frame: Option<String> = None;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::VerificationTimeout {
                    waited: started.elapsed(),
                    wanted,
                    last_frame,
                });
            }
            let timeout = self.timeouts.read.min(deadline - now);

            let frame = match self.read_frame(timeout) {
                Ok(frame) => frame,
                Err(Error::Timeout) => continue,
                Err(Error::ConnectionClosed) => {
                    debug!("peer closed while waiting for {}", wanted);
                    return Ok(Waited::Closed);
                }
                Err(e) => return Err(e),
            };

            let block = match self.absorb_headers(&frame) {
                Ok(block) => block,
                Err(e) => {
                    debug!("ignoring header block: {}", e);
                    None
                }
            };

            match on_frame(&frame, block.as_ref())? {
                Step::Done(value) => return Ok(Waited::Matched(value)),
                Step::Continue => last_frame = Some(frame.to_string()),
            }
        }
    }
}

fn check_code(frame: FrameType, expected: ErrorCode, actual: u32) -> Result<()> {
    if actual == expected.as_u32() {
        Ok(())
    } else {
        Err(Error::UnexpectedErrorCode {
            frame,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::established_pair;
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    #[test]
    fn test_connection_error_matches_goaway() {
        let (mut server, mut client) = established_pair();
        client.write_ping(false, *b"drainme!").unwrap();
        client
            .write_goaway(0, ErrorCode::ProtocolError, Bytes::from_static(b"stream 0"))
            .unwrap();

        server.verify_connection_error(ErrorCode::ProtocolError).unwrap();
    }

    #[test]
    fn test_connection_error_wrong_code() {
        let (mut server, mut client) = established_pair();
        client
            .write_goaway(0, ErrorCode::FrameSizeError, Bytes::new())
            .unwrap();

        match server.verify_connection_error(ErrorCode::ProtocolError) {
            Err(Error::UnexpectedErrorCode { frame, expected, actual }) => {
                assert_eq!(frame, FrameType::Goaway);
                assert_eq!(expected, ErrorCode::ProtocolError);
                assert_eq!(actual, ErrorCode::FrameSizeError.as_u32());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_bare_close_policy() {
        let (mut server, client) = established_pair();
        drop(client);
        assert!(matches!(
            server.verify_connection_error(ErrorCode::ProtocolError),
            Err(Error::UnexpectedClose { .. })
        ));

        let (mut server, client) = established_pair();
        drop(client);
        server.set_accept_bare_close(true);
        server.verify_connection_error(ErrorCode::ProtocolError).unwrap();
    }

    #[test]
    fn test_silence_is_verification_timeout() {
        let (mut server, _client) = established_pair();
        let start = Instant::now();

        let result = server.verify_connection_error(ErrorCode::ProtocolError);
        assert!(matches!(result, Err(Error::VerificationTimeout { .. })));
        assert!(start.elapsed() >= server.timeouts().verify);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_stream_error_ignores_other_streams() {
        let (mut server, mut client) = established_pair();
        client.write_rst_stream(3, ErrorCode::Cancel).unwrap();
        client.write_rst_stream(1, ErrorCode::FrameSizeError).unwrap();

        server.verify_stream_error(1, ErrorCode::FrameSizeError).unwrap();
    }

    #[test]
    fn test_stream_error_accepts_escalation() {
        let (mut server, mut client) = established_pair();
        client
            .write_goaway(1, ErrorCode::FrameSizeError, Bytes::new())
            .unwrap();

        server.verify_stream_error(1, ErrorCode::FrameSizeError).unwrap();
    }

    #[test]
    fn test_headers_frame_and_ping_ack() {
        let (mut server, mut client) = established_pair();
        let fields = vec![(":status".to_string(), "200".to_string())];

        server.write_headers(1, &fields, false).unwrap();
        server.write_ping(true, *b"h2conf!!").unwrap();

        assert_eq!(client.verify_headers_frame(1).unwrap(), fields);
        client.verify_ping_ack(*b"h2conf!!").unwrap();
    }
}
