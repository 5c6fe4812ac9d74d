//! Test cases and their outcomes

use super::group::TestGroup;
use crate::config::Config;
use crate::conn::{Conn, Request};
use crate::h2::{Error, Result};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// Outcome of one case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    /// Failed, with the reason shown to the user
    Failed(String),
    /// Filtered out or not applicable to the running driver
    Skipped,
}

impl Outcome {
    /// Short label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed(_) => "failed",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Recorded result: outcome plus elapsed time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub outcome: Outcome,
    pub duration: Duration,
}

impl TestResult {
    /// A passing result
    pub fn passed(duration: Duration) -> Self {
        TestResult {
            outcome: Outcome::Passed,
            duration,
        }
    }

    /// A failing result
    pub fn failed(reason: impl Into<String>, duration: Duration) -> Self {
        TestResult {
            outcome: Outcome::Failed(reason.into()),
            duration,
        }
    }

    /// A case that never ran
    pub fn skipped() -> Self {
        TestResult {
            outcome: Outcome::Skipped,
            duration: Duration::ZERO,
        }
    }

    /// Convert a run's return value
    pub fn from_run(result: Result<()>, duration: Duration) -> Self {
        match result {
            Ok(()) => TestResult::passed(duration),
            Err(e) => TestResult::failed(e.to_string(), duration),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Failed(reason) => write!(f, "failed after {:?}: {}", self.duration, reason),
            other => write!(f, "{} in {:?}", other.label(), self.duration),
        }
    }
}

/// Body of a case exercising a server under test
pub type ServerRunFn = dyn Fn(&Config, &mut Conn) -> Result<()> + Send + Sync;

/// Body of a case exercising a client under test
pub type ClientRunFn = dyn Fn(&Config, &mut Conn, &Request) -> Result<()> + Send + Sync;

/// Run function, tagged by which side is under test
pub enum Run {
    /// Driven by [`crate::ClientDriver`] over a connection we dialed
    Server(Box<ServerRunFn>),
    /// Driven by [`crate::ServerDispatcher`] after the client's request
    Client(Box<ClientRunFn>),
}

impl Run {
    /// Whether the case targets a server implementation
    pub fn targets_server(&self) -> bool {
        matches!(self, Run::Server(_))
    }
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Run::Server(_) => f.write_str("Run::Server(..)"),
            Run::Client(_) => f.write_str("Run::Client(..)"),
        }
    }
}

/// A single conformance check
pub struct TestCase {
    desc: String,
    requirement: String,
    run: Run,
    accept_bare_close: bool,
    pub(super) parent: Weak<TestGroup>,
    pub(super) index: usize,
    pub(super) result: Mutex<Option<TestResult>>,
}

impl TestCase {
    /// A case against a server under test
    pub fn server<F>(desc: impl Into<String>, requirement: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Config, &mut Conn) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_run(desc, requirement, Run::Server(Box::new(run)))
    }

    /// A case against a client under test
    pub fn client<F>(desc: impl Into<String>, requirement: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Config, &mut Conn, &Request) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_run(desc, requirement, Run::Client(Box::new(run)))
    }

    fn with_run(desc: impl Into<String>, requirement: impl Into<String>, run: Run) -> Self {
        TestCase {
            desc: desc.into(),
            requirement: requirement.into(),
            run,
            accept_bare_close: false,
            parent: Weak::new(),
            index: 0,
            result: Mutex::new(None),
        }
    }

    /// Accept a bare TCP close where a GOAWAY is expected
    pub fn accept_bare_close(mut self, accept: bool) -> Self {
        self.accept_bare_close = accept;
        self
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Requirement text quoted from the RFC
    pub fn requirement(&self) -> &str {
        &self.requirement
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn accepts_bare_close(&self) -> bool {
        self.accept_bare_close
    }

    /// Owning group, if it is still alive
    pub fn parent(&self) -> Option<Arc<TestGroup>> {
        self.parent.upgrade()
    }

    /// Section of the owning group
    pub fn section(&self) -> String {
        self.parent()
            .map(|g| g.section().to_string())
            .unwrap_or_default()
    }

    /// 1-based position within the owning group
    pub fn index(&self) -> usize {
        self.index
    }

    /// Case id, `"<section>/<index>"`
    pub fn id(&self) -> String {
        format!("{}/{}", self.section(), self.index)
    }

    /// Latest recorded result
    pub fn result(&self) -> Option<TestResult> {
        self.lock_result().clone()
    }

    pub(super) fn lock_result(&self) -> MutexGuard<'_, Option<TestResult>> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepare a connection for this case and run it against a server
    ///
    /// A panicking body fails the case instead of unwinding into the driver.
    pub fn run_server(&self, config: &Config, conn: &mut Conn) -> Result<()> {
        conn.set_accept_bare_close(self.accept_bare_close);
        match &self.run {
            Run::Server(f) => contain(|| f(config, conn)),
            Run::Client(_) => Err(Error::Config(format!("case {} targets clients", self.id()))),
        }
    }

    /// Prepare a connection for this case and run it against a client
    pub fn run_client(&self, config: &Config, conn: &mut Conn, request: &Request) -> Result<()> {
        conn.set_accept_bare_close(self.accept_bare_close);
        match &self.run {
            Run::Client(f) => contain(|| f(config, conn, request)),
            Run::Server(_) => Err(Error::Config(format!("case {} targets servers", self.id()))),
        }
    }
}

fn contain(run: impl FnOnce() -> Result<()>) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id())
            .field("desc", &self.desc)
            .field("run", &self.run)
            .field("accept_bare_close", &self.accept_bare_close)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::testing::{conn_pair, quick_timeouts};

    #[test]
    fn test_result_from_run() {
        let ok = TestResult::from_run(Ok(()), Duration::from_millis(5));
        assert!(ok.is_passed());
        assert_eq!(ok.to_string(), "passed in 5ms");

        let err = TestResult::from_run(Err(Error::Timeout), Duration::from_millis(5));
        assert!(err.is_failed());
        assert_eq!(err.outcome, Outcome::Failed("Timeout".to_string()));

        assert!(TestResult::skipped().is_skipped());
    }

    #[test]
    fn test_detached_case_id() {
        let case = TestCase::server("d", "r", |_, _| Ok(())).accept_bare_close(true);
        assert!(case.accepts_bare_close());
        assert!(case.run().targets_server());
        assert!(case.parent().is_none());
        assert_eq!(case.id(), "/0");
        assert!(case.result().is_none());
    }

    #[test]
    fn test_panicking_case_fails() {
        let (_server, mut client) = conn_pair(quick_timeouts());
        let config = Config::default();

        let case = TestCase::server("d", "r", |_, _| panic!("index out of range"));
        match case.run_server(&config, &mut client) {
            Err(Error::Panicked(msg)) => assert_eq!(msg, "index out of range"),
            other => panic!("expected panic to be contained, got {:?}", other),
        }

        let request = Request::default();
        let case = TestCase::client("d", "r", |_, _, req| panic!("stream {}", req.stream_id));
        let result = TestResult::from_run(case.run_client(&config, &mut client, &request), Duration::ZERO);
        assert_eq!(result.outcome, Outcome::Failed("Case panicked: stream 0".to_string()));
    }
}
