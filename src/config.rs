use std::fmt;
use std::num::NonZeroU16;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mapper;


/// Errors that may occur while building a [`GatewayConfig`].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The FastCGI network kind is neither `tcp` nor `unix`.
    #[error("unknown FastCGI network {0:?}, expected \"tcp\" or \"unix\"")]
    UnknownNetwork(String),
    /// The FastCGI address is empty.
    #[error("FastCGI address must not be empty")]
    EmptyAddress,
    /// The document root is a relative path.
    #[error("document root {0:?} is not an absolute path")]
    RelativeRoot(PathBuf),
    /// The script extension is empty, lacks a leading `.`, or contains `/`.
    #[error("invalid script extension {0:?}")]
    InvalidExtension(String),
    /// The index file name is empty or contains `/`.
    #[error("invalid index file name {0:?}")]
    InvalidIndexFile(String),
}


/// The address of the FastCGI application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A TCP socket address in `host:port` form.
    Tcp(String),
    /// The filesystem path of a Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Builds an [`Endpoint`] from a network kind and an address.
    ///
    /// # Errors
    /// Returns an error if `network` is unknown or `address` is empty.
    pub fn new(network: &str, address: &str) -> Result<Self, ConfigError> {
        if address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        match network {
            "tcp" => Ok(Self::Tcp(address.to_owned())),
            "unix" => Ok(Self::Unix(address.into())),
            _ => Err(ConfigError::UnknownNetwork(network.to_owned())),
        }
    }

    /// Returns the network kind of the endpoint.
    #[must_use]
    pub fn network(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Unix(_) => "unix",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}


/// The immutable configuration shared by all requests of a gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    endpoint: Endpoint,
    document_root: PathBuf,
    url_prefix: String,
    script_extension: String,
    index_file: String,
    max_requests: NonZeroU16,
    connect_timeout: Duration,
    io_timeout: Duration,
    max_buffered_body: usize,
    server_software: String,
}

impl GatewayConfig {
    /// The default suffix identifying script requests.
    pub const DEFAULT_EXTENSION: &'static str = ".php";
    /// The default file appended to directory URLs.
    pub const DEFAULT_INDEX: &'static str = "index.php";

    /// Creates a configuration with default settings.
    ///
    /// `document_root` is normalized lexically and `url_prefix` loses its
    /// trailing slashes, so `/php/` becomes `/php` and `/` becomes empty.
    ///
    /// # Errors
    /// Returns [`ConfigError::RelativeRoot`] if `document_root` is relative.
    pub fn new(endpoint: Endpoint, document_root: impl Into<PathBuf>, url_prefix: &str) -> Result<Self, ConfigError> {
        let root = document_root.into();
        if !root.is_absolute() {
            return Err(ConfigError::RelativeRoot(root));
        }
        Ok(Self {
            endpoint,
            document_root: mapper::normalize(&root),
            url_prefix: url_prefix.trim_end_matches('/').to_owned(),
            script_extension: Self::DEFAULT_EXTENSION.to_owned(),
            index_file: Self::DEFAULT_INDEX.to_owned(),
            max_requests: NonZeroU16::MIN.saturating_add(19),
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(60),
            max_buffered_body: 8 << 20,
            server_software: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
        })
    }

    /// Sets the suffix identifying script requests, such as `.php`.
    ///
    /// # Errors
    /// Returns an error unless `ext` starts with `.` and contains no `/`.
    pub fn with_script_extension(mut self, ext: &str) -> Result<Self, ConfigError> {
        if ext.len() < 2 || !ext.starts_with('.') || ext.contains('/') {
            return Err(ConfigError::InvalidExtension(ext.to_owned()));
        }
        ext.clone_into(&mut self.script_extension);
        Ok(self)
    }

    /// Sets the file name appended to directory URLs.
    ///
    /// # Errors
    /// Returns an error if `name` is empty or contains `/`.
    pub fn with_index_file(mut self, name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(ConfigError::InvalidIndexFile(name.to_owned()));
        }
        name.clone_into(&mut self.index_file);
        Ok(self)
    }

    /// Sets the request ID bound handed to the FastCGI client.
    #[must_use]
    pub fn with_max_requests(mut self, max: NonZeroU16) -> Self {
        self.max_requests = max;
        self
    }

    /// Sets the deadline for connecting to the FastCGI application.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the deadline for each read and write on a FastCGI connection.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the largest request body buffered to compute `CONTENT_LENGTH`.
    #[must_use]
    pub fn with_max_buffered_body(mut self, max: usize) -> Self {
        self.max_buffered_body = max;
        self
    }

    /// Sets the `SERVER_SOFTWARE` value reported to applications.
    #[must_use]
    pub fn with_server_software(mut self, software: impl Into<String>) -> Self {
        self.server_software = software.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[inline]
    #[must_use]
    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    /// The mount prefix without trailing slashes. Empty if unset.
    #[inline]
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    #[inline]
    #[must_use]
    pub fn script_extension(&self) -> &str {
        &self.script_extension
    }

    #[inline]
    #[must_use]
    pub fn index_file(&self) -> &str {
        &self.index_file
    }

    #[inline]
    #[must_use]
    pub fn max_requests(&self) -> NonZeroU16 {
        self.max_requests
    }

    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[inline]
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    #[inline]
    #[must_use]
    pub fn max_buffered_body(&self) -> usize {
        self.max_buffered_body
    }

    #[inline]
    #[must_use]
    pub fn server_software(&self) -> &str {
        &self.server_software
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::Tcp("127.0.0.1:9000".into())
    }

    #[test]
    fn endpoints() {
        assert_eq!(Endpoint::new("tcp", "127.0.0.1:9000").ok(), Some(endpoint()));
        let unix = Endpoint::new("unix", "/run/php-fpm.sock");
        assert!(matches!(&unix, Ok(Endpoint::Unix(p)) if p == Path::new("/run/php-fpm.sock")));
        assert_eq!(unix.map(|e| e.to_string()).ok().as_deref(), Some("unix:/run/php-fpm.sock"));
        assert!(matches!(Endpoint::new("udp", "x"), Err(ConfigError::UnknownNetwork(n)) if n == "udp"));
        assert!(matches!(Endpoint::new("tcp", ""), Err(ConfigError::EmptyAddress)));
    }

    #[test]
    fn defaults() -> Result<(), ConfigError> {
        let config = GatewayConfig::new(endpoint(), "/srv/www/./app/", "")?;
        assert_eq!(config.document_root(), Path::new("/srv/www/app"));
        assert_eq!(config.script_extension(), ".php");
        assert_eq!(config.index_file(), "index.php");
        assert_eq!(config.max_requests().get(), 20);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.io_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_buffered_body(), 8 * 1024 * 1024);
        assert!(config.server_software().starts_with("fastcgi-gateway/"));
        Ok(())
    }

    #[test]
    fn prefix_trimmed() -> Result<(), ConfigError> {
        for (input, want) in [("/php/", "/php"), ("/php", "/php"), ("/", ""), ("", ""), ("/a//", "/a")] {
            let config = GatewayConfig::new(endpoint(), "/srv", input)?;
            assert_eq!(config.url_prefix(), want, "prefix {input:?}");
        }
        Ok(())
    }

    #[test]
    fn rejects_invalid() {
        assert!(matches!(GatewayConfig::new(endpoint(), "www", ""), Err(ConfigError::RelativeRoot(_))));
        let config = GatewayConfig::new(endpoint(), "/srv", "").expect("valid config");
        for ext in ["", ".", "php", ".p/hp"] {
            let res = config.clone().with_script_extension(ext);
            assert!(matches!(res, Err(ConfigError::InvalidExtension(_))), "extension {ext:?}");
        }
        for name in ["", "a/b", ".."] {
            let res = config.clone().with_index_file(name);
            assert!(matches!(res, Err(ConfigError::InvalidIndexFile(_))), "index {name:?}");
        }
        assert!(config.with_script_extension(".phtml").is_ok());
    }
}
