use std::{fmt, str::FromStr};

use http::Uri;
use thiserror::Error;
use url::Url;

/// Errors related to the upstream target
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Error when the base URL is invalid
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// Error when base + path does not form a valid URI
    #[error("Invalid target URI '{uri}': {reason}")]
    InvalidTarget { uri: String, reason: String },
}

/// Result type for upstream operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// The single fixed origin every forwarded request goes to.
///
/// Parsed once at startup and never mutated; the forwarder only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamTarget {
    /// Base URL without trailing slash, e.g. `https://links.example.com` or `http://host:8080/api`
    base: String,
    host: String,
    port: Option<u16>,
    is_secure: bool,
}

impl UpstreamTarget {
    /// Validate and wrap a base URL.
    pub fn parse(base_url: &str) -> UpstreamResult<Self> {
        let url = Url::parse(base_url.trim())
            .map_err(|e| UpstreamError::InvalidUrl(format!("{base_url}: {e}")))?;

        let is_secure = match url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(UpstreamError::InvalidUrl(format!(
                    "Upstream URL must start with http:// or https://, got scheme '{other}'"
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| UpstreamError::InvalidUrl(format!("{base_url}: missing host")))?
            .to_string();

        if url.query().is_some() || url.fragment().is_some() {
            return Err(UpstreamError::InvalidUrl(format!(
                "{base_url}: base URL must not carry a query or fragment"
            )));
        }

        // `Url` normalizes an empty path to "/", which would double up with the inbound path.
        let base = url.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            base,
            host,
            port: url.port(),
            is_secure,
        })
    }

    /// The configured base URL (no trailing slash)
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Hostname of the upstream, without port
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Value for the outbound `Host` header. Includes the port only when it is not the scheme default.
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// Check if the upstream uses HTTPS
    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    /// Base + inbound path + inbound query string, verbatim. No path rewriting.
    pub fn target_uri(&self, path: &str, query: Option<&str>) -> UpstreamResult<Uri> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let target = match query {
            Some(q) => format!("{}{}?{}", self.base, path, q),
            None => format!("{}{}", self.base, path),
        };

        target
            .parse::<Uri>()
            .map_err(|e| UpstreamError::InvalidTarget {
                uri: target.clone(),
                reason: e.to_string(),
            })
    }
}

impl FromStr for UpstreamTarget {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}
