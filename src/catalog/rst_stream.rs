//! 6.4 RST_STREAM

use super::open_stream;
use crate::conn::common_resp_headers;
use crate::h2::{ErrorCode, FrameType};
use crate::model::{TestCase, TestGroup};
use std::sync::Arc;

const ZERO_STREAM: &str = "Sends a RST_STREAM frame with 0x0 stream identifier";
const IDLE_STREAM: &str = "Sends a RST_STREAM frame on a idle stream";
const BAD_LENGTH: &str = "Sends a RST_STREAM frame with a length other than 4 octets";

const PROTOCOL_ERROR: &str = "The endpoint MUST respond with a connection error of type PROTOCOL_ERROR.";
const FRAME_SIZE_ERROR: &str = "The endpoint MUST respond with a connection error of type FRAME_SIZE_ERROR.";

pub(super) fn server_cases(parent: &Arc<TestGroup>) {
    let group = parent.add_test_group("6.4", "RST_STREAM");

    // RST_STREAM frames MUST be associated with a stream. If a RST_STREAM
    // frame is received with a stream identifier of 0x0, the recipient
    // MUST treat this as a connection error of type PROTOCOL_ERROR.
    group.add_test_case(TestCase::server(ZERO_STREAM, PROTOCOL_ERROR, |_, conn| {
        conn.write_rst_stream(0, ErrorCode::Cancel)?;
        conn.verify_connection_error(ErrorCode::ProtocolError)
    }));

    // RST_STREAM frames MUST NOT be sent for a stream in the "idle" state.
    group.add_test_case(TestCase::server(IDLE_STREAM, PROTOCOL_ERROR, |_, conn| {
        let idle = conn.next_stream_id();
        conn.write_rst_stream(idle, ErrorCode::Cancel)?;
        conn.verify_connection_error(ErrorCode::ProtocolError)
    }));

    // A RST_STREAM frame with a length other than 4 octets MUST be treated
    // as a connection error of type FRAME_SIZE_ERROR.
    group.add_test_case(TestCase::server(BAD_LENGTH, FRAME_SIZE_ERROR, |config, conn| {
        let stream_id = open_stream(config, conn, false)?;
        conn.write_raw_frame(FrameType::RstStream.as_u8(), 0x0, stream_id, b"\x00\x00\x00")?;
        conn.verify_connection_error(ErrorCode::FrameSizeError)
    }));
}

pub(super) fn client_cases(parent: &Arc<TestGroup>) {
    let group = parent.add_test_group("6.4", "RST_STREAM");

    group.add_test_case(TestCase::client(ZERO_STREAM, PROTOCOL_ERROR, |_, conn, _| {
        conn.write_rst_stream(0, ErrorCode::Cancel)?;
        conn.verify_connection_error(ErrorCode::ProtocolError)
    }));

    // Stream 2 is server-initiated and was never opened
    group.add_test_case(TestCase::client(IDLE_STREAM, PROTOCOL_ERROR, |_, conn, _| {
        conn.write_rst_stream(2, ErrorCode::Cancel)?;
        conn.verify_connection_error(ErrorCode::ProtocolError)
    }));

    // Respond first so the stream is half-closed, then reset it with a
    // 3-octet payload. A RST_STREAM or a GOAWAY both count.
    group.add_test_case(TestCase::client(BAD_LENGTH, FRAME_SIZE_ERROR, |_, conn, request| {
        conn.write_headers(request.stream_id, &common_resp_headers(), true)?;
        conn.write_raw_frame(FrameType::RstStream.as_u8(), 0x0, request.stream_id, b"\x00\x00\x00")?;
        conn.verify_stream_error(request.stream_id, ErrorCode::FrameSizeError)
    }));
}
