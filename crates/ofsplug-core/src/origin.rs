//! Destination origins for outbound messages.
//!
//! Origin format: `scheme://host[:port]`
//!
//! The origin is never taken from a message. It is derived from the document
//! that embedded the plugin (its referrer), falling back to the first
//! ancestor origin.

use std::fmt;
use std::str::FromStr;
use url::Url;

/// A `scheme://authority` origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
}

impl Origin {
    /// Create an origin from its parts.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    /// Derive the origin to send to.
    ///
    /// Uses the referrer when it parses, otherwise the first ancestor origin.
    /// Returns `None` when neither yields a usable origin.
    pub fn derive<S: AsRef<str>>(referrer: Option<&str>, ancestor_origins: &[S]) -> Option<Self> {
        referrer
            .and_then(|r| r.parse().ok())
            .or_else(|| ancestor_origins.first().and_then(|a| a.as_ref().parse().ok()))
    }

    /// The scheme (e.g., "https").
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host, including any port.
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}

impl FromStr for Origin {
    type Err = OriginError;

    /// Reduce a URL to its origin the way a browser does: path, query,
    /// fragment, userinfo and a default port are dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s.trim()).map_err(|source| OriginError::Invalid {
            input: s.to_string(),
            source,
        })?;
        if !url.origin().is_tuple() {
            return Err(OriginError::Opaque(s.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| OriginError::Opaque(s.to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self::new(url.scheme(), host))
    }
}

/// Error deriving an origin from a URL.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OriginError {
    #[error("invalid origin URL {input:?}: {source}")]
    Invalid {
        input: String,
        #[source]
        source: url::ParseError,
    },
    /// The URL has no `scheme://host` origin (e.g. `file:` or `data:`).
    #[error("URL has an opaque origin: {0}")]
    Opaque(String),
}
