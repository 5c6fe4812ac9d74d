//! h2conform - HTTP/2 conformance testing
//!
//! Runs catalogues of protocol test cases against HTTP/2 implementations
//! over cleartext TCP or TLS with ALPN `h2`.
//!
//! Two modes share one connection engine ([`Conn`]) and one result tree
//! ([`TestGroup`]):
//!
//! - [`ClientDriver`] dials a server under test once per case and acts as
//!   the client.
//! - [`ServerDispatcher`] opens one listener per case and acts as the
//!   server for clients under test.
//!
//! # Examples
//!
//! ```no_run
//! use h2conform::{catalog, ClientDriver, Config, LogReporter, Targets};
//! use std::sync::Arc;
//!
//! h2conform::init_logging();
//!
//! let config = Config::builder()
//!     .host("127.0.0.1")
//!     .port(8080)
//!     .targets(Targets::parse("6.4")?)
//!     .build()?;
//!
//! let driver = ClientDriver::new(config, Arc::new(LogReporter))?;
//! let tally = driver.run(&catalog::server_suite());
//! println!("{}", tally);
//! # Ok::<(), h2conform::h2::Error>(())
//! ```

pub mod catalog;
pub mod config;
pub mod conn;
pub mod dispatcher;
pub mod driver;
pub mod h2;
pub mod model;
pub mod report;
pub mod session;
pub mod tls;

pub use config::{Config, ConfigBuilder, Targets, Timeouts};
pub use conn::{common_headers, common_resp_headers, Conn, ConnState, Request, Role};
pub use dispatcher::ServerDispatcher;
pub use driver::ClientDriver;
pub use model::{record_result, Outcome, Run, Tally, TestCase, TestGroup, TestResult};
pub use report::{LogReporter, NullReporter, Reporter};

use env_logger::{Builder, Target};

/// Install a stderr logger filtered by `RUST_LOG`
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = Builder::from_default_env().target(Target::Stderr).try_init();
}
