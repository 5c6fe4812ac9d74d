//! Server-conformance driver
//!
//! [`ClientDriver`] dials the server under test once per selected case,
//! performs the client handshake and runs the case. Cases run on a bounded
//! pool of worker threads.

use crate::config::Config;
use crate::conn::Conn;
use crate::h2::Result;
use crate::model::{record_result, Run, Tally, TestCase, TestGroup, TestResult};
use crate::report::Reporter;
use crate::tls::TlsConfig;
use log::{debug, info};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Runs server-targeted cases against a remote server
pub struct ClientDriver {
    config: Config,
    addr: SocketAddr,
    tls: Option<TlsConfig>,
    reporter: Arc<dyn Reporter>,
}

impl ClientDriver {
    /// Validate the configuration and prepare TLS
    ///
    /// An unresolvable target or bad TLS material fails here, before any
    /// case runs.
    pub fn new(config: Config, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let addr = config.target_addr()?;
        let tls = config.tls_client_config()?;

        Ok(ClientDriver {
            config,
            addr,
            tls,
            reporter,
        })
    }

    /// Resolved target address
    pub fn target(&self) -> SocketAddr {
        self.addr
    }

    fn selected(&self, case: &TestCase) -> bool {
        matches!(case.run(), Run::Server(_)) && self.config.targets.matches(&case.section(), case.index())
    }

    /// Run every case under `root`, returning the root tally
    ///
    /// Cases that are filtered out, or that target clients, are recorded
    /// as skipped.
    pub fn run(&self, root: &Arc<TestGroup>) -> Tally {
        for case in root.collect_test_cases(|c| !self.selected(c)) {
            self.finish(&case, TestResult::skipped());
        }

        let cases = root.collect_test_cases(|c| self.selected(c));
        let workers = self.config.max_concurrency.min(cases.len());
        info!(
            "running {} cases against {} with {} workers",
            cases.len(),
            self.addr,
            workers
        );

        let next = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(case) = cases.get(i) else { break };
                    let result = self.run_case(case);
                    self.finish(case, result);
                });
            }
        });

        self.reporter.suite_finished(root);
        root.tally()
    }

    /// Run one case over a fresh connection
    pub fn run_case(&self, case: &TestCase) -> TestResult {
        let start = Instant::now();
        debug!("{} {}: connecting to {}", case.id(), case.desc(), self.addr);

        let mut conn = match Conn::dial(self.addr, self.tls.as_ref(), self.config.timeouts) {
            Ok(conn) => conn,
            Err(e) => return TestResult::failed(format!("connect: {}", e), start.elapsed()),
        };

        if let Err(e) = conn.handshake() {
            return TestResult::failed(e.to_string(), start.elapsed());
        }

        let outcome = case.run_server(&self.config, &mut conn);
        let elapsed = start.elapsed();

        if let Err(e) = conn.close() {
            debug!("{}: close failed: {}", case.id(), e);
        }

        TestResult::from_run(outcome, elapsed)
    }

    fn finish(&self, case: &TestCase, result: TestResult) {
        record_result(case, result.clone());
        self.reporter.case_finished(case, &result);
    }
}
