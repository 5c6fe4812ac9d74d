//! Client driver integration tests
//!
//! The driver runs the reference catalogue against scripted servers on
//! loopback:
//! - a conformant server answering every violation as RFC 7540 requires
//! - a silent server that never answers
//! - a port nobody listens on

use bytes::Bytes;
use h2conform::catalog;
use h2conform::h2::{ErrorCode, FrameType};
use h2conform::{
    ClientDriver, Config, Conn, NullReporter, Outcome, Reporter, Targets, TestCase, TestGroup, TestResult, Timeouts,
};
use std::collections::HashSet;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn quick_timeouts() -> Timeouts {
    Timeouts {
        handshake: Duration::from_secs(2),
        read: Duration::from_millis(100),
        verify: Duration::from_millis(500),
        close_grace: Duration::from_millis(10),
    }
}

fn config(port: u16, targets: &str) -> Config {
    Config::builder()
        .host("127.0.0.1")
        .port(port)
        .targets(Targets::parse(targets).unwrap())
        .timeouts(quick_timeouts())
        .build()
        .unwrap()
}

/// Start a server on an ephemeral port, one thread per connection
fn spawn_server(conformant: bool) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || serve(stream, conformant));
        }
    });

    port
}

enum Reply {
    Goaway(ErrorCode),
    Reset(u32, ErrorCode),
}

fn serve(stream: TcpStream, conformant: bool) {
    let mut conn = Conn::accept(stream, None, quick_timeouts()).unwrap();
    if conn.handshake().is_err() {
        return;
    }

    let mut open = HashSet::new();

    // Keep reading until the driver hangs up so our replies are not lost
    // to a reset
    while let Ok(frame) = conn.read_frame(Duration::from_secs(2)) {
        let stream_id = frame.stream_id();
        let reply = match frame.frame_type() {
            Some(FrameType::Headers) => {
                open.insert(stream_id);
                None
            }
            Some(FrameType::Priority) if stream_id == 0 => Some(Reply::Goaway(ErrorCode::ProtocolError)),
            Some(FrameType::Priority) if frame.payload_len() != 5 => {
                Some(Reply::Reset(stream_id, ErrorCode::FrameSizeError))
            }
            Some(FrameType::RstStream) if stream_id == 0 => Some(Reply::Goaway(ErrorCode::ProtocolError)),
            Some(FrameType::RstStream) if frame.payload_len() != 4 => Some(Reply::Goaway(ErrorCode::FrameSizeError)),
            Some(FrameType::RstStream) if !open.contains(&stream_id) => Some(Reply::Goaway(ErrorCode::ProtocolError)),
            _ => None,
        };

        if !conformant {
            continue;
        }

        let last = open.iter().copied().max().unwrap_or(0);
        let sent = match reply {
            Some(Reply::Goaway(code)) => conn.write_goaway(last, code, Bytes::new()),
            Some(Reply::Reset(id, code)) => conn.write_rst_stream(id, code),
            None => Ok(()),
        };
        if sent.is_err() {
            break;
        }
    }
}

/// Start a server that answers the handshake with a HEADERS frame whose
/// block is a truncated dynamic table size update
fn spawn_malformed_hpack_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || {
                let mut conn = Conn::accept(stream, None, quick_timeouts()).unwrap();
                if conn.handshake().is_err() {
                    return;
                }
                // END_HEADERS on stream 1
                if conn.write_raw_frame(FrameType::Headers.as_u8(), 0x4, 1, &[0x3f]).is_err() {
                    return;
                }
                while conn.read_frame(Duration::from_secs(2)).is_ok() {}
            });
        }
    });

    port
}

#[derive(Default)]
struct RecordingReporter {
    finished: Mutex<Vec<(String, &'static str)>>,
    suites: Mutex<usize>,
}

impl Reporter for RecordingReporter {
    fn case_finished(&self, case: &TestCase, result: &TestResult) {
        self.finished
            .lock()
            .unwrap()
            .push((case.id(), result.outcome.label()));
    }

    fn suite_finished(&self, _root: &Arc<TestGroup>) {
        *self.suites.lock().unwrap() += 1;
    }
}

fn outcome_of(root: &Arc<TestGroup>, id: &str) -> Outcome {
    root.find_case(id).unwrap().result().unwrap().outcome
}

#[test]
fn test_conformant_server_passes_everything() {
    let port = spawn_server(true);
    let reporter = Arc::new(RecordingReporter::default());

    let driver = ClientDriver::new(config(port, ""), reporter.clone()).unwrap();
    let root = catalog::server_suite();
    let tally = driver.run(&root);

    for case in root.collect_test_cases(|_| true) {
        assert_eq!(case.result().unwrap().outcome, Outcome::Passed, "{}", case.id());
    }
    assert_eq!(tally.passed, 5);
    assert_eq!(tally.failed, 0);
    assert_eq!(tally.total(), 5);

    assert_eq!(reporter.finished.lock().unwrap().len(), 5);
    assert_eq!(*reporter.suites.lock().unwrap(), 1);
}

#[test]
fn test_targets_skip_unselected_cases() {
    let port = spawn_server(true);

    let driver = ClientDriver::new(config(port, "6.4/1,6.3"), Arc::new(NullReporter)).unwrap();
    let root = catalog::server_suite();
    let tally = driver.run(&root);

    assert_eq!(tally.passed, 3);
    assert_eq!(tally.skipped, 2);
    assert_eq!(tally.executed(), 3);
    assert_eq!(outcome_of(&root, "6.4/1"), Outcome::Passed);
    assert_eq!(outcome_of(&root, "6.4/2"), Outcome::Skipped);
    assert_eq!(outcome_of(&root, "6.4/3"), Outcome::Skipped);

    let section = root.find_case("6.3/1").unwrap().parent().unwrap();
    assert_eq!(section.tally().passed, 2);
}

#[test]
fn test_silent_server_fails_verification() {
    let port = spawn_server(false);

    let driver = ClientDriver::new(config(port, "6.4/1"), Arc::new(NullReporter)).unwrap();
    let root = catalog::server_suite();
    let tally = driver.run(&root);

    assert_eq!(tally.failed, 1);
    match outcome_of(&root, "6.4/1") {
        Outcome::Failed(reason) => {
            assert!(reason.contains("GOAWAY"), "{}", reason);
            assert!(reason.contains("timed out"), "{}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_unreachable_server_fails_cases() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let driver = ClientDriver::new(config(port, "6.3/1"), Arc::new(NullReporter)).unwrap();
    assert_eq!(driver.target().port(), port);
    let root = catalog::server_suite();
    let tally = driver.run(&root);

    assert_eq!(tally.failed, 1);
    assert_eq!(tally.skipped, 4);
    match outcome_of(&root, "6.3/1") {
        Outcome::Failed(reason) => assert!(reason.starts_with("connect"), "{}", reason),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_client_cases_are_skipped() {
    // Nothing listens here; the driver must not dial for client cases
    let driver = ClientDriver::new(config(9, ""), Arc::new(NullReporter)).unwrap();
    let root = catalog::client_suite();
    let tally = driver.run(&root);

    assert_eq!(tally.skipped, 3);
    assert_eq!(tally.executed(), 0);
}

#[test]
fn test_single_worker() {
    let port = spawn_server(true);

    let config = Config::builder()
        .host("127.0.0.1")
        .port(port)
        .timeouts(quick_timeouts())
        .max_concurrency(1)
        .build()
        .unwrap();

    let driver = ClientDriver::new(config, Arc::new(NullReporter)).unwrap();
    let tally = driver.run(&catalog::server_suite());

    assert_eq!(tally.passed, 5);
}

#[test]
fn test_malformed_header_block_fails_case() {
    let port = spawn_malformed_hpack_server();
    let reporter = Arc::new(RecordingReporter::default());

    let driver = ClientDriver::new(config(port, "6.4/1"), reporter.clone()).unwrap();
    let root = catalog::server_suite();
    let tally = driver.run(&root);

    assert_eq!(tally.failed, 1);
    assert_eq!(tally.skipped, 4);
    match outcome_of(&root, "6.4/1") {
        Outcome::Failed(reason) => assert!(reason.contains("timed out"), "{}", reason),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(*reporter.suites.lock().unwrap(), 1);
}
