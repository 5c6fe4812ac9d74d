//! 6.3 PRIORITY

use super::open_stream;
use crate::h2::{ErrorCode, FrameType};
use crate::model::{TestCase, TestGroup};
use std::sync::Arc;

pub(super) fn server_cases(parent: &Arc<TestGroup>) {
    let group = parent.add_test_group("6.3", "PRIORITY");

    // The PRIORITY frame always identifies a stream. If a PRIORITY frame
    // is received with a stream identifier of 0x0, the recipient MUST
    // respond with a connection error of type PROTOCOL_ERROR.
    group.add_test_case(TestCase::server(
        "Sends a PRIORITY frame with 0x0 stream identifier",
        "The endpoint MUST respond with a connection error of type PROTOCOL_ERROR.",
        |config, conn| {
            open_stream(config, conn, false)?;

            // exclusive, depends on stream 1, weight 10
            conn.write_raw_frame(FrameType::Priority.as_u8(), 0x0, 0, b"\x80\x00\x00\x01\x0a")?;

            conn.verify_connection_error(ErrorCode::ProtocolError)
        },
    ));

    // A PRIORITY frame with a length other than 5 octets MUST be treated
    // as a stream error of type FRAME_SIZE_ERROR.
    group.add_test_case(TestCase::server(
        "Sends a PRIORITY frame with a length other than 5 octets",
        "The endpoint MUST respond with a stream error of type FRAME_SIZE_ERROR.",
        |config, conn| {
            let stream_id = open_stream(config, conn, false)?;

            conn.write_raw_frame(FrameType::Priority.as_u8(), 0x0, stream_id, b"\x80\x00\x00\x01")?;

            conn.verify_stream_error(stream_id, ErrorCode::FrameSizeError)
        },
    ));
}
