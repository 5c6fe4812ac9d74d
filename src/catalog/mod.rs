//! Reference catalogue
//!
//! A small set of RFC 7540 section 6 cases, enough to drive both modes end
//! to end. Server-targeted cases run through [`crate::ClientDriver`];
//! client-targeted ones through [`crate::ServerDispatcher`].

mod priority;
mod rst_stream;

use crate::config::Config;
use crate::conn::{common_headers, Conn};
use crate::h2::Result;
use crate::model::TestGroup;
use std::sync::Arc;

/// Cases exercising a server implementation
pub fn server_suite() -> Arc<TestGroup> {
    let root = TestGroup::root("Hypertext Transfer Protocol Version 2 (HTTP/2)");
    let frames = root.add_test_group("6", "Frame Definitions");
    priority::server_cases(&frames);
    rst_stream::server_cases(&frames);
    root
}

/// Cases exercising a client implementation
pub fn client_suite() -> Arc<TestGroup> {
    let root = TestGroup::root("Hypertext Transfer Protocol Version 2 (HTTP/2)");
    let frames = root.add_test_group("6", "Frame Definitions");
    rst_stream::client_cases(&frames);
    root
}

/// Open a request stream with the common request headers
fn open_stream(config: &Config, conn: &mut Conn, end_stream: bool) -> Result<u32> {
    let stream_id = conn.next_stream_id();
    conn.write_headers(stream_id, &common_headers(config), end_stream)?;
    Ok(stream_id)
}
