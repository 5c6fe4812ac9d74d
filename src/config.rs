//! Run configuration
//!
//! A [`Config`] is assembled once through [`ConfigBuilder`] and then shared
//! read-only by every driver thread.

use crate::h2::{Error, Result};
use crate::tls::{TlsConfig, TlsVersion};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Timeouts bounding every blocking step of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Connect, TLS handshake, preface/SETTINGS exchange and request read
    pub handshake: Duration,
    /// A single frame read inside a verification loop
    pub read: Duration,
    /// Overall wait of one verification
    pub verify: Duration,
    /// Delay between our closing GOAWAY and closing the transport
    pub close_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            handshake: Duration::from_secs(2),
            read: Duration::from_millis(500),
            verify: Duration::from_secs(3),
            close_grace: Duration::from_secs(1),
        }
    }
}

/// A single selection entry
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Section and everything below it ("6", "6.4")
    Section(String),
    /// One case ("6.4/2")
    Case(String, usize),
}

/// Section/case selection
///
/// An empty selection matches everything. Sections match on dot
/// boundaries, so `6` selects `6.4` but `6.1` does not select `6.10`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    entries: Vec<Target>,
}

impl Targets {
    /// Select every case
    pub fn all() -> Self {
        Targets::default()
    }

    /// Parse a comma-separated list such as `"6.3, 6.4/2"`
    pub fn parse(list: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let target = match item.split_once('/') {
                Some((section, index)) => {
                    let index: usize = index
                        .parse()
                        .ok()
                        .filter(|i| *i > 0)
                        .ok_or_else(|| Error::Config(format!("invalid case index in target '{}'", item)))?;
                    Target::Case(normalize(section), index)
                }
                None => Target::Section(normalize(item)),
            };
            entries.push(target);
        }

        Ok(Targets { entries })
    }

    /// Whether every case is selected
    pub fn is_all(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether case `index` (1-based) of `section` is selected
    pub fn matches(&self, section: &str, index: usize) -> bool {
        if self.entries.is_empty() {
            return true;
        }

        self.entries.iter().any(|target| match target {
            Target::Section(prefix) => section_within(section, prefix),
            Target::Case(sec, i) => sec == section && *i == index,
        })
    }
}

impl fmt::Display for Targets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "all");
        }
        for (i, target) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match target {
                Target::Section(s) => write!(f, "{}", s)?,
                Target::Case(s, n) => write!(f, "{}/{}", s, n)?,
            }
        }
        Ok(())
    }
}

fn normalize(section: &str) -> String {
    section.trim().trim_end_matches('.').to_string()
}

fn section_within(section: &str, prefix: &str) -> bool {
    section == prefix
        || (section.len() > prefix.len()
            && section.starts_with(prefix)
            && section.as_bytes()[prefix.len()] == b'.')
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Target host (client mode) or bind host (server mode)
    pub host: String,
    /// Target port (client mode)
    pub port: u16,
    /// Use TLS with ALPN h2
    pub tls: bool,
    /// PEM certificate for server mode, may also hold the key
    pub cert_file: Option<PathBuf>,
    /// PEM private key for server mode
    pub key_file: Option<PathBuf>,
    /// Verify the target's certificate in client mode
    pub verify_peer: bool,
    /// Trust anchors used when verifying the target
    pub ca_file: Option<PathBuf>,
    /// Lowest TLS version offered or accepted
    pub tls_min_version: TlsVersion,
    /// First listener port in server mode, 0 for ephemeral ports
    pub base_port: u16,
    /// Section/case selection
    pub targets: Targets,
    /// Timeouts
    pub timeouts: Timeouts,
    /// Concurrent connections in client mode
    pub max_concurrency: usize,
    /// Request path for generated requests
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 80,
            tls: false,
            cert_file: None,
            key_file: None,
            verify_peer: false,
            ca_file: None,
            tls_min_version: TlsVersion::Tls12,
            base_port: 5000,
            targets: Targets::all(),
            timeouts: Timeouts::default(),
            max_concurrency: 4,
            path: "/".to_string(),
        }
    }
}

impl Config {
    /// Start building a configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Resolve the target address
    pub fn target_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::Config(format!("cannot resolve {}:{}: {}", self.host, self.port, e)))?
            .next()
            .ok_or_else(|| Error::Config(format!("{}:{} resolved to no address", self.host, self.port)))
    }

    /// `:scheme` for generated requests
    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "https"
        } else {
            "http"
        }
    }

    /// `:authority` for generated requests
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client-side TLS settings, `None` for plain TCP
    pub fn tls_client_config(&self) -> Result<Option<TlsConfig>> {
        if !self.tls {
            return Ok(None);
        }

        let mut builder = TlsConfig::client()?
            .min_version(self.tls_min_version)?
            .verify_peer(self.verify_peer);
        if let Some(ca) = &self.ca_file {
            builder = builder.ca_file(ca)?;
        }
        // SNI only makes sense for names
        let builder = if self.host.parse::<std::net::IpAddr>().is_err() {
            builder.servername(self.host.clone())
        } else {
            builder
        };
        Ok(Some(builder.build()))
    }

    /// Server-side TLS settings, `None` for plain TCP
    ///
    /// Without a certificate file the built-in self-signed one is used.
    pub fn tls_server_config(&self) -> Result<Option<TlsConfig>> {
        if !self.tls {
            return Ok(None);
        }

        let builder = TlsConfig::server()?.min_version(self.tls_min_version)?;
        let builder = match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => builder.cert_and_key_files(cert, key)?,
            (Some(cert), None) => builder.cert_file(cert)?,
            (None, Some(_)) => {
                return Err(Error::Config("key file given without certificate file".to_string()))
            }
            (None, None) => builder,
        };
        Ok(Some(builder.build()?))
    }
}

/// Builder for [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder with default values
    pub fn new() -> Self {
        ConfigBuilder::default()
    }

    /// Set the target or bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the target port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Enable TLS
    pub fn tls(mut self, enable: bool) -> Self {
        self.config.tls = enable;
        self
    }

    /// Server certificate (PEM)
    pub fn cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cert_file = Some(path.into());
        self
    }

    /// Server private key (PEM)
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.key_file = Some(path.into());
        self
    }

    /// Verify the target certificate
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.config.verify_peer = verify;
        self
    }

    /// First listener port in server mode
    pub fn base_port(mut self, port: u16) -> Self {
        self.config.base_port = port;
        self
    }

    /// Section/case selection
    pub fn targets(mut self, targets: Targets) -> Self {
        self.config.targets = targets;
        self
    }

    /// All timeouts at once
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Connect and handshake bound
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.handshake = timeout;
        self
    }

    /// Single frame read bound
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.read = timeout;
        self
    }

    /// Overall verification bound
    pub fn verify_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.verify = timeout;
        self
    }

    /// Grace period before closing the transport
    pub fn close_grace(mut self, grace: Duration) -> Self {
        self.config.timeouts.close_grace = grace;
        self
    }

    /// Concurrent connections in client mode
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max;
        self
    }

    /// Request path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_file = Some(path.into());
        self
    }

    pub fn tls_min_version(mut self, version: TlsVersion) -> Self {
        self.config.tls_min_version = version;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<Config> {
        let config = self.config;

        if config.host.is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if config.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".to_string()));
        }
        if !config.path.starts_with('/') {
            return Err(Error::Config(format!("path '{}' must start with '/'", config.path)));
        }

        let t = &config.timeouts;
        if t.handshake.is_zero() || t.read.is_zero() || t.verify.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_sections() {
        let targets = Targets::parse("6.4, 5").unwrap();
        assert!(targets.matches("6.4", 1));
        assert!(targets.matches("6.4.1", 3));
        assert!(targets.matches("5.1", 1));
        assert!(!targets.matches("6.3", 1));
        assert!(!targets.matches("6.40", 1));
        assert_eq!(targets.to_string(), "6.4,5");
    }

    #[test]
    fn test_targets_single_case() {
        let targets = Targets::parse("6.4/2").unwrap();
        assert!(targets.matches("6.4", 2));
        assert!(!targets.matches("6.4", 1));
        assert!(!targets.matches("6.4.1", 2));
    }

    #[test]
    fn test_targets_empty_matches_all() {
        let targets = Targets::parse("").unwrap();
        assert!(targets.is_all());
        assert!(targets.matches("8.1", 7));
    }

    #[test]
    fn test_targets_invalid_index() {
        assert!(Targets::parse("6.4/0").is_err());
        assert!(Targets::parse("6.4/x").is_err());
    }

    #[test]
    fn test_builder_validation() {
        assert!(Config::builder().max_concurrency(0).build().is_err());
        assert!(Config::builder().path("index.html").build().is_err());
        assert!(Config::builder().verify_timeout(Duration::ZERO).build().is_err());

        let config = Config::builder()
            .host("localhost")
            .port(8443)
            .tls(true)
            .build()
            .unwrap();
        assert_eq!(config.scheme(), "https");
        assert_eq!(config.authority(), "localhost:8443");
    }

    #[test]
    fn test_tls_configs_follow_flag() {
        let plain = Config::default();
        assert!(plain.tls_client_config().unwrap().is_none());
        assert!(plain.tls_server_config().unwrap().is_none());

        let tls = Config::builder().tls(true).build().unwrap();
        assert!(tls.tls_server_config().unwrap().unwrap().is_server());
        assert!(!tls.tls_client_config().unwrap().unwrap().is_server());
    }

    #[test]
    fn test_tls13_only() {
        let config = Config::builder()
            .tls(true)
            .tls_min_version(TlsVersion::Tls13)
            .build()
            .unwrap();
        assert!(config.tls_client_config().unwrap().is_some());
        assert!(config.tls_server_config().unwrap().is_some());
    }

    #[test]
    fn test_missing_ca_file_is_tls_error() {
        let config = Config::builder()
            .tls(true)
            .verify_peer(true)
            .ca_file("/nonexistent/ca.pem")
            .build()
            .unwrap();
        assert!(matches!(config.tls_client_config(), Err(Error::Tls(_))));
    }

    #[test]
    fn test_key_without_cert_rejected() {
        let config = Config::builder().tls(true).key_file("/tmp/key.pem").build().unwrap();
        assert!(matches!(config.tls_server_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_target_addr_resolves() {
        let config = Config::builder().host("127.0.0.1").port(8080).build().unwrap();
        assert_eq!(config.target_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());
    }
}
