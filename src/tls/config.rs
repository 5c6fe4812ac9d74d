//! TLS configuration
//!
//! Client and server configuration builders over an OpenSSL context. Both
//! sides advertise ALPN `h2` by default.

use openssl::pkey::PKey;
use openssl::ssl::{AlpnError, SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::X509;
use std::fs;
use std::path::Path;

/// ALPN identifier for HTTP/2 over TLS
pub const ALPN_H2: &str = "h2";

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("ALPN negotiation failed: expected h2, got {0:?}")]
    AlpnFailed(Option<String>),
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    pub(crate) is_server: bool,
    pub(crate) servername: Option<String>,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> Result<ClientConfigBuilder, TlsError> {
        ClientConfigBuilder::new()
    }

    /// Create a new server configuration builder
    pub fn server() -> Result<ServerConfigBuilder, TlsError> {
        ServerConfigBuilder::new()
    }

    /// Whether this is a server-side configuration
    pub fn is_server(&self) -> bool {
        self.is_server
    }
}

/// Encode ALPN protocols (length-prefixed)
fn alpn_wire(protocols: &[&str]) -> Vec<u8> {
    let mut alpn_bytes = Vec::new();
    for proto in protocols {
        alpn_bytes.push(proto.len() as u8);
        alpn_bytes.extend_from_slice(proto.as_bytes());
    }
    alpn_bytes
}

/// Read a PEM file holding a certificate and possibly its key
fn read_pem<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, TlsError> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| TlsError::Certificate(format!("{}: {}", path.display(), e)))
}

/// Install a certificate and private key into a context builder
fn install_identity(ctx_builder: &mut SslContextBuilder, cert_pem: &[u8], key_pem: &[u8]) -> Result<(), TlsError> {
    let cert = X509::from_pem(cert_pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load certificate: {}", e)))?;
    ctx_builder.set_certificate(&cert)?;

    let key = PKey::private_key_from_pem(key_pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load private key: {}", e)))?;
    ctx_builder.set_private_key(&key)?;

    ctx_builder.check_private_key()?;
    Ok(())
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    ctx_builder: SslContextBuilder,
    servername: Option<String>,
}

impl ClientConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        // Default: don't verify peer (targets usually run self-signed certs)
        ctx_builder.set_verify(SslVerifyMode::NONE);
        ctx_builder.set_alpn_protos(&alpn_wire(&[ALPN_H2]))?;

        Ok(ClientConfigBuilder {
            ctx_builder,
            servername: None,
        })
    }

    /// Set minimum TLS version
    pub fn min_version(mut self, version: TlsVersion) -> Result<Self, TlsError> {
        self.ctx_builder
            .set_min_proto_version(Some(version.to_openssl_version()))?;
        Ok(self)
    }

    /// Set SNI servername
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        if verify {
            self.ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            self.ctx_builder.set_verify(SslVerifyMode::NONE);
        }
        self
    }

    /// Trust anchors for peer verification
    pub fn ca_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, TlsError> {
        self.ctx_builder.set_ca_file(path.as_ref())?;
        Ok(self)
    }

    /// Build the TLS configuration
    pub fn build(self) -> TlsConfig {
        TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: false,
            servername: self.servername,
        }
    }
}

/// Server configuration builder
pub struct ServerConfigBuilder {
    ctx_builder: SslContextBuilder,
    has_cert: bool,
}

impl ServerConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_server())?;
        ctx_builder.set_min_proto_version(Some(TlsVersion::Tls12.to_openssl_version()))?;

        // Server-side protocol negotiation: accept only h2
        ctx_builder.set_alpn_select_callback(|_ssl, client_protos| {
            let mut pos = 0;
            while pos < client_protos.len() {
                let len = client_protos[pos] as usize;
                pos += 1;
                if pos + len > client_protos.len() {
                    break;
                }
                let client_proto = &client_protos[pos..pos + len];
                if client_proto == ALPN_H2.as_bytes() {
                    return Ok(client_proto);
                }
                pos += len;
            }

            Err(AlpnError::NOACK)
        });

        Ok(ServerConfigBuilder {
            ctx_builder,
            has_cert: false,
        })
    }

    /// Set minimum TLS version
    pub fn min_version(mut self, version: TlsVersion) -> Result<Self, TlsError> {
        self.ctx_builder
            .set_min_proto_version(Some(version.to_openssl_version()))?;
        Ok(self)
    }

    /// Load certificate and private key from a single PEM file
    pub fn cert_file<P: AsRef<Path>>(self, path: P) -> Result<Self, TlsError> {
        let pem = read_pem(path)?;
        self.identity(&pem, &pem)
    }

    /// Load certificate and private key from separate PEM files
    pub fn cert_and_key_files<P: AsRef<Path>, Q: AsRef<Path>>(self, cert: P, key: Q) -> Result<Self, TlsError> {
        let cert_pem = read_pem(cert)?;
        let key_pem = read_pem(key)?;
        self.identity(&cert_pem, &key_pem)
    }

    fn identity(mut self, cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        install_identity(&mut self.ctx_builder, cert_pem, key_pem)?;
        self.has_cert = true;
        Ok(self)
    }

    /// Build the TLS configuration
    ///
    /// Falls back to the built-in self-signed certificate when none was
    /// loaded.
    pub fn build(mut self) -> Result<TlsConfig, TlsError> {
        if !self.has_cert {
            let pem = super::builtin_cert::BUILTIN_CERT.as_bytes();
            self = self.identity(pem, pem)?;
        }

        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: true,
            servername: None,
        })
    }
}
