//! Configuration data structures for the edge forwarder.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and to
//! `EDGE_FORWARDER__*` environment variables. Every section carries defaults so a
//! minimal config only needs `upstream.base_url`.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default crate version used for identity headers.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top level configuration. Constant for the lifetime of the process.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Address the HTTP listener binds to (e.g. `0.0.0.0:8080`)
    pub listen_addr: String,
    pub upstream: UpstreamConfig,
    pub forwarding: ForwardingConfig,
    pub identity: IdentityConfig,
    pub limits: LimitsConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

impl ForwarderConfig {
    /// Create a new configuration builder
    pub fn builder() -> ForwarderConfigBuilder {
        ForwarderConfigBuilder::default()
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            upstream: UpstreamConfig::default(),
            forwarding: ForwardingConfig::default(),
            identity: IdentityConfig::default(),
            limits: LimitsConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// The single canonical backend every request is forwarded to.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the backend, e.g. `https://links.example.com`. Required.
    pub base_url: String,
    /// Overall budget for one upstream round trip, parsed by humantime ("10s", "1500ms")
    pub timeout: String,
    /// Budget for establishing the TCP/TLS connection
    pub connect_timeout: String,
    /// Immediate retries for connection-establishment failures only. 0 disables.
    pub connect_retries: u32,
    /// How long idle pooled connections are kept
    pub pool_idle_timeout: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: "10s".to_string(),
            connect_timeout: "5s".to_string(),
            connect_retries: 0,
            pool_idle_timeout: "90s".to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Parsed [`UpstreamConfig::timeout`].
    pub fn timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.timeout)
    }

    /// Parsed [`UpstreamConfig::connect_timeout`].
    pub fn connect_timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.connect_timeout)
    }

    /// Parsed [`UpstreamConfig::pool_idle_timeout`].
    pub fn pool_idle_timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.pool_idle_timeout)
    }
}

/// Outbound header policy knobs.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Additional inbound headers copied upstream verbatim (e.g. `referer`).
    /// Extends the built-in allow-list; never a blanket pass-through.
    pub extra_headers: Vec<String>,
    /// Value sent as `X-Forwarded-Proto`
    pub forwarded_proto: String,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            extra_headers: Vec::new(),
            forwarded_proto: "https".to_string(),
        }
    }
}

/// How the proxy names itself in headers, JSON bodies and the error page.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    /// Implementation tag reported by the health and debug endpoints
    pub proxy_tag: String,
    /// Sent upstream as `X-Proxy-Version`
    pub version: String,
    /// Default `User-Agent` when the client sent none
    pub user_agent: String,
    /// `X-Powered-By` value on success and error responses
    pub powered_by: String,
    /// Link-creation entry point shown on the error page
    pub home_url: String,
    /// Product name shown on the error page
    pub brand: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            proxy_tag: "edge-forwarder".to_string(),
            version: PKG_VERSION.to_string(),
            user_agent: format!("Edge-Forwarder/{PKG_VERSION}"),
            powered_by: format!("Edge Forwarder v{PKG_VERSION}"),
            home_url: "/".to_string(),
            brand: "Edge Forwarder".to_string(),
        }
    }
}

/// Resource limits.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request body forwarded upstream; bigger bodies get a 413 page
    pub max_body_bytes: usize,
    /// Upper bound on simultaneous upstream calls
    pub max_concurrent_upstream: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            max_concurrent_upstream: 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Answer `OPTIONS` locally with the CORS headers instead of forwarding it
    pub answer_preflight: bool,
}

/// Output format for log lines.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `edge_forwarder=debug,info`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Builder for ForwarderConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ForwarderConfigBuilder {
    listen_addr: Option<String>,
    base_url: Option<String>,
    timeout: Option<String>,
    connect_retries: Option<u32>,
    extra_headers: Vec<String>,
    identity: Option<IdentityConfig>,
    limits: Option<LimitsConfig>,
    answer_preflight: bool,
}

impl ForwarderConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the upstream base URL
    pub fn upstream(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the upstream timeout (humantime format)
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = Some(retries);
        self
    }

    /// Allow one more inbound header through to the upstream
    pub fn extra_header(mut self, name: impl Into<String>) -> Self {
        self.extra_headers.push(name.into());
        self
    }

    pub fn identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn answer_preflight(mut self, enabled: bool) -> Self {
        self.answer_preflight = enabled;
        self
    }

    /// Build the final ForwarderConfig
    pub fn build(self) -> Result<ForwarderConfig, String> {
        let base_url = self
            .base_url
            .ok_or_else(|| "upstream base_url is required".to_string())?;

        let defaults = ForwarderConfig::default();
        Ok(ForwarderConfig {
            listen_addr: self.listen_addr.unwrap_or(defaults.listen_addr),
            upstream: UpstreamConfig {
                base_url,
                timeout: self.timeout.unwrap_or(defaults.upstream.timeout),
                connect_retries: self
                    .connect_retries
                    .unwrap_or(defaults.upstream.connect_retries),
                ..defaults.upstream
            },
            forwarding: ForwardingConfig {
                extra_headers: self.extra_headers,
                ..defaults.forwarding
            },
            identity: self.identity.unwrap_or(defaults.identity),
            limits: self.limits.unwrap_or(defaults.limits),
            cors: CorsConfig {
                answer_preflight: self.answer_preflight,
            },
            logging: defaults.logging,
        })
    }
}
