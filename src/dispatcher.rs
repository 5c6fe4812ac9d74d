//! Client-conformance dispatcher
//!
//! [`ServerDispatcher`] opens one listener per selected case, on
//! `base_port + index`. A client under test connects to a case's port, we
//! accept, handshake, read its request and then run the case against it.
//! Every accepted socket is handled on its own thread, so a silent client
//! never blocks further accepts.

use crate::config::Config;
use crate::conn::Conn;
use crate::h2::{Error, Result};
use crate::model::{record_result, Run, TestCase, TestGroup, TestResult};
use crate::report::Reporter;
use crate::session::poll_fd;
use crate::tls::TlsConfig;
use log::{debug, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often accept loops look at the shutdown flag
const ACCEPT_POLL: Duration = Duration::from_millis(100);

const LISTEN_BACKLOG: i32 = 128;

/// State shared by every accept loop and connection thread
struct Shared {
    config: Config,
    tls: Option<TlsConfig>,
    reporter: Arc<dyn Reporter>,
    shutdown: AtomicBool,
}

struct Listener {
    addr: SocketAddr,
    case: Arc<TestCase>,
    thread: Option<JoinHandle<()>>,
}

/// One listener per case, serving clients under test
pub struct ServerDispatcher {
    root: Arc<TestGroup>,
    shared: Arc<Shared>,
    listeners: Vec<Listener>,
}

impl ServerDispatcher {
    /// Bind a listener for every selected client-targeted case and start
    /// accepting
    ///
    /// Cases that are filtered out, or that target servers, are recorded as
    /// skipped. If any listener cannot bind, nothing is started and the
    /// error is returned.
    pub fn listen(config: Config, root: Arc<TestGroup>, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let tls = config.tls_server_config()?;
        let ip = resolve_bind_ip(&config.host)?;

        let selected = |c: &TestCase| {
            matches!(c.run(), Run::Client(_)) && config.targets.matches(&c.section(), c.index())
        };
        let cases = root.collect_test_cases(selected);
        let skipped = root.collect_test_cases(|c| !selected(c));

        let mut sockets = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            let port = port_for(config.base_port, index)?;
            let listener = bind(SocketAddr::new(ip, port))?;
            sockets.push((listener, case.clone()));
        }

        for case in &skipped {
            let result = TestResult::skipped();
            record_result(case, result.clone());
            reporter.case_finished(case, &result);
        }

        let shared = Arc::new(Shared {
            config,
            tls,
            reporter,
            shutdown: AtomicBool::new(false),
        });

        let mut dispatcher = ServerDispatcher {
            root,
            shared,
            listeners: Vec::with_capacity(sockets.len()),
        };

        for (listener, case) in sockets {
            // Dropping the dispatcher on error stops the loops already started
            let addr = listener.local_addr()?;
            info!("{} {}: listening on {}", case.id(), case.desc(), addr);

            let thread = {
                let shared = dispatcher.shared.clone();
                let case = case.clone();
                thread::Builder::new()
                    .name(format!("accept-{}", case.id()))
                    .spawn(move || accept_loop(listener, case, shared))?
            };

            dispatcher.listeners.push(Listener {
                addr,
                case,
                thread: Some(thread),
            });
        }

        Ok(dispatcher)
    }

    /// Listener addresses in dispatch order
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.addr).collect()
    }

    /// Listener address serving the case with id `case_id`
    pub fn addr_of(&self, case_id: &str) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.case.id() == case_id)
            .map(|l| l.addr)
    }

    /// Cases being served, in dispatch order
    pub fn cases(&self) -> Vec<Arc<TestCase>> {
        self.listeners.iter().map(|l| l.case.clone()).collect()
    }

    /// Whether every served case has a result
    pub fn is_complete(&self) -> bool {
        self.listeners.iter().all(|l| l.case.result().is_some())
    }

    /// Block until every served case has a result or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_complete() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
        true
    }

    /// Stop every listener
    ///
    /// Connections already accepted finish on their own threads.
    pub fn close(&mut self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        for listener in &mut self.listeners {
            if let Some(thread) = listener.thread.take() {
                if thread.join().is_err() {
                    warn!("accept loop for {} panicked", listener.case.id());
                }
            }
        }

        self.shared.reporter.suite_finished(&self.root);
    }
}

impl Drop for ServerDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve_bind_ip(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse() {
        return Ok(ip);
    }
    (host, 0)
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("cannot resolve {}: {}", host, e)))?
        .next()
        .map(|a| a.ip())
        .ok_or_else(|| Error::Config(format!("{} resolved to no address", host)))
}

fn port_for(base_port: u16, index: usize) -> Result<u16> {
    if base_port == 0 {
        return Ok(0);
    }
    u16::try_from(base_port as usize + index)
        .map_err(|_| Error::Config(format!("port {} + {} out of range", base_port, index)))
}

/// Create a listening socket with SO_REUSEADDR
fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener_err = |source: io::Error| Error::Listener {
        addr: addr.to_string(),
        source,
    };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(listener_err)?;
    socket.set_reuse_address(true).map_err(listener_err)?;
    socket.bind(&addr.into()).map_err(listener_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(listener_err)?;
    socket.set_nonblocking(true).map_err(listener_err)?;

    Ok(socket.into())
}

fn accept_loop(listener: TcpListener, case: Arc<TestCase>, shared: Arc<Shared>) {
    let fd = listener.as_raw_fd();

    while !shared.shutdown.load(Ordering::SeqCst) {
        match poll_fd(fd, Some(ACCEPT_POLL)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!("{}: poll failed: {}", case.id(), e);
                thread::sleep(ACCEPT_POLL);
                continue;
            }
        }

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                warn!("{}: accept failed: {}", case.id(), e);
                continue;
            }
        };
        debug!("{}: accepted {}", case.id(), peer);

        let case = case.clone();
        let shared = shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", case.id()))
            .spawn(move || handle_conn(stream, &case, &shared));
        if let Err(e) = spawned {
            warn!("cannot spawn connection thread: {}", e);
        }
    }

    debug!("{}: listener closed", case.id());
}

/// Serve one client connection
///
/// Setup failures abandon the attempt without recording anything, so the
/// case stays open for the next connection.
fn handle_conn(stream: TcpStream, case: &TestCase, shared: &Shared) {
    let start = Instant::now();

    if let Err(e) = stream.set_nonblocking(false) {
        debug!("{}: abandoned: {}", case.id(), e);
        return;
    }

    let mut conn = match Conn::accept(stream, shared.tls.as_ref(), shared.config.timeouts) {
        Ok(conn) => conn,
        Err(e) => {
            debug!("{}: abandoned: {}", case.id(), e);
            return;
        }
    };

    if let Err(e) = conn.handshake() {
        debug!("{}: abandoned: {}", case.id(), e);
        return;
    }

    let request = match conn.read_request() {
        Ok(request) => request,
        Err(e) => {
            debug!("{}: abandoned: {}", case.id(), e);
            return;
        }
    };

    let outcome = case.run_client(&shared.config, &mut conn, &request);
    let result = TestResult::from_run(outcome, start.elapsed());

    let closer = thread::Builder::new()
        .name(format!("close-{}", case.id()))
        .spawn(move || {
            if let Err(e) = conn.close() {
                debug!("close failed: {}", e);
            }
        });
    if let Err(e) = closer {
        debug!("cannot spawn close thread: {}", e);
    }

    record_result(case, result.clone());
    shared.reporter.case_finished(case, &result);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_assignment() {
        assert_eq!(port_for(0, 7).unwrap(), 0);
        assert_eq!(port_for(5000, 2).unwrap(), 5002);
        assert!(matches!(port_for(65535, 1), Err(Error::Config(_))));
    }

    #[test]
    fn test_bind_conflict_is_listener_error() {
        let first = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let taken = first.local_addr().unwrap();

        match bind(taken) {
            Err(Error::Listener { addr, .. }) => assert_eq!(addr, taken.to_string()),
            other => panic!("expected listener error, got {:?}", other.map(|l| l.local_addr())),
        }
    }

    #[test]
    fn test_resolve_bind_ip() {
        assert_eq!(resolve_bind_ip("127.0.0.1").unwrap(), IpAddr::from([127, 0, 0, 1]));
        assert!(resolve_bind_ip("localhost").is_ok());
    }
}
