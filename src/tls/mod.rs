//! TLS transport
//!
//! OpenSSL-backed sessions for both roles. Every session negotiates ALPN
//! `h2`; a peer that selects anything else fails the handshake.
//!
//! ```no_run
//! use h2conform::tls::{TlsConfig, TlsSessionOps};
//! use std::net::TcpStream;
//! use std::time::Duration;
//!
//! let config = TlsConfig::client()?.servername("localhost").verify_peer(false).build();
//! let tcp = TcpStream::connect("127.0.0.1:8443")?;
//! let session = TlsSessionOps::connect(tcp, &config, Duration::from_secs(2))?;
//! assert_eq!(session.alpn_protocol().as_deref(), Some("h2"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builtin_cert;
mod config;
mod session;

pub use config::{ClientConfigBuilder, ServerConfigBuilder, TlsConfig, TlsError, TlsVersion, ALPN_H2};
pub use session::TlsSessionOps;
