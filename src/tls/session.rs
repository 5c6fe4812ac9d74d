//! TLS session operations
//!
//! This module implements the SessionOps trait for TLS connections,
//! enabling transparent switching between plain TCP and TLS I/O.

use super::config::{TlsConfig, TlsError, ALPN_H2};
use crate::h2::{Error, Result as H2Result};
use crate::session::{poll_fd, SessionOps};
use openssl::ssl::{Ssl, SslStream};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS session operations
///
/// Wraps an OpenSSL SslStream and provides poll/read/write/close operations.
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    failed: bool,
}

impl TlsSessionOps {
    /// Create a client TLS connection (perform handshake)
    ///
    /// `timeout` bounds every blocking socket operation, so a peer that
    /// stalls mid-handshake cannot hang the caller.
    pub fn connect(tcp_stream: TcpStream, config: &TlsConfig, timeout: Duration) -> Result<Self, TlsError> {
        if config.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use server config for client connection".to_string(),
            ));
        }

        tcp_stream.set_read_timeout(Some(timeout))?;
        tcp_stream.set_write_timeout(Some(timeout))?;

        let mut ssl = Ssl::new(&config.ctx)?;
        if let Some(ref servername) = config.servername {
            ssl.set_hostname(servername)?;
        }

        let stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))?;

        let session = TlsSessionOps {
            stream,
            failed: false,
        };
        session.require_h2()?;
        Ok(session)
    }

    /// Accept a client connection with TLS (perform handshake)
    pub fn accept(tcp_stream: TcpStream, config: &TlsConfig, timeout: Duration) -> Result<Self, TlsError> {
        if !config.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use client config for server accept".to_string(),
            ));
        }

        tcp_stream.set_read_timeout(Some(timeout))?;
        tcp_stream.set_write_timeout(Some(timeout))?;

        let ssl = Ssl::new(&config.ctx)?;
        let stream = ssl
            .accept(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Accept failed: {}", e)))?;

        let session = TlsSessionOps {
            stream,
            failed: false,
        };
        session.require_h2()?;
        Ok(session)
    }

    /// Negotiated ALPN protocol
    pub fn alpn_protocol(&self) -> Option<String> {
        self.stream
            .ssl()
            .selected_alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned())
    }

    fn require_h2(&self) -> Result<(), TlsError> {
        match self.alpn_protocol() {
            Some(ref proto) if proto == ALPN_H2 => Ok(()),
            other => Err(TlsError::AlpnFailed(other)),
        }
    }
}

impl SessionOps for TlsSessionOps {
    fn poll_read(&self, timeout: Option<Duration>) -> H2Result<bool> {
        // Decrypted bytes may already be buffered inside OpenSSL
        if self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        poll_fd(self.stream.get_ref().as_raw_fd(), timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> H2Result<usize> {
        self.stream.read(buf).map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn write(&mut self, buf: &[u8]) -> H2Result<usize> {
        self.stream.write(buf).map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn flush(&mut self) -> H2Result<()> {
        self.stream.flush().map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn close(&mut self) -> H2Result<()> {
        // Best-effort close_notify, the peer may be gone already
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(Error::from(e)),
            _ => Ok(()),
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.get_ref().peer_addr().ok()
    }
}
