//! Header policy for both directions.
//!
//! Outbound requests carry an explicit allow-list of client headers plus a set of
//! synthesized forwarding headers; nothing else from the client reaches the upstream.
//! Successful responses get a fixed decoration set regardless of what the upstream sent.
use chrono::{DateTime, SecondsFormat, Utc};
use eyre::{Result, WrapErr};
use http::{
    HeaderMap, HeaderName, HeaderValue, Uri,
    header::{self, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, HOST, USER_AGENT},
};

use crate::{config::ForwarderConfig, core::upstream::UpstreamTarget};

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_ORIGINAL_HOST: HeaderName = HeaderName::from_static("x-original-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
/// Edge-identity marker sent upstream
pub const X_EDGE_PROXY: HeaderName = HeaderName::from_static("x-edge-proxy");
pub const X_PROXY_VERSION: HeaderName = HeaderName::from_static("x-proxy-version");
pub const X_PROXY_TIMESTAMP: HeaderName = HeaderName::from_static("x-proxy-timestamp");
/// Identity header on success and error responses
pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");
pub const X_PROXY_HOST: HeaderName = HeaderName::from_static("x-proxy-host");
pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

pub const DEFAULT_ACCEPT: &str = "*/*";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=300";
pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "*";
pub const UNKNOWN: &str = "unknown";

/// Headers the proxy writes itself; they can never be configured as pass-through.
const MANAGED_HEADERS: [HeaderName; 12] = [
    HOST,
    USER_AGENT,
    ACCEPT,
    ACCEPT_LANGUAGE,
    X_FORWARDED_HOST,
    X_ORIGINAL_HOST,
    X_FORWARDED_PROTO,
    X_FORWARDED_FOR,
    X_REAL_IP,
    X_EDGE_PROXY,
    X_PROXY_VERSION,
    X_PROXY_TIMESTAMP,
];

// Framing is re-derived from the buffered body.
const HOP_BY_HOP_HEADERS: [HeaderName; 7] = [
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::CONTENT_LENGTH,
];

/// True for headers the proxy synthesizes or that describe connection framing.
pub fn is_synthesized_header(name: &HeaderName) -> bool {
    MANAGED_HEADERS.contains(name)
        || HOP_BY_HOP_HEADERS.contains(name)
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Hostname the client addressed: URI authority first (HTTP/2, absolute-form), then `Host`.
/// The port is stripped; `unknown` when neither is present.
pub fn inbound_hostname(uri: &Uri, headers: &HeaderMap) -> String {
    if let Some(host) = uri.host().filter(|h| !h.is_empty()) {
        return host.to_string();
    }

    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_port)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn strip_port(authority: &str) -> &str {
    let authority = authority.trim();
    // IPv6 literal, e.g. "[::1]:8080"
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }
    authority
        .rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map_or(authority, |(host, _)| host)
}

/// Pre-built header values derived from configuration.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    upstream_host: HeaderValue,
    forwarded_proto: HeaderValue,
    default_user_agent: HeaderValue,
    version: HeaderValue,
    powered_by: HeaderValue,
    extra_headers: Vec<HeaderName>,
}

impl HeaderPolicy {
    pub fn new(config: &ForwarderConfig, upstream: &UpstreamTarget) -> Result<Self> {
        let extra_headers = config
            .forwarding
            .extra_headers
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .wrap_err_with(|| format!("Invalid extra header name: {name}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            upstream_host: HeaderValue::from_str(&upstream.host_header())
                .wrap_err("Upstream host is not a valid header value")?,
            forwarded_proto: HeaderValue::from_str(&config.forwarding.forwarded_proto)
                .wrap_err("Invalid forwarding.forwarded_proto")?,
            default_user_agent: HeaderValue::from_str(&config.identity.user_agent)
                .wrap_err("Invalid identity.user_agent")?,
            version: HeaderValue::from_str(&config.identity.version)
                .wrap_err("Invalid identity.version")?,
            powered_by: HeaderValue::from_str(&config.identity.powered_by)
                .wrap_err("Invalid identity.powered_by")?,
            extra_headers,
        })
    }

    /// The `X-Powered-By` value
    pub fn powered_by(&self) -> &HeaderValue {
        &self.powered_by
    }

    /// Build the complete outbound header set from the inbound one.
    pub fn outbound_headers(
        &self,
        inbound: &HeaderMap,
        hostname: &str,
        now: DateTime<Utc>,
    ) -> HeaderMap {
        let mut out = HeaderMap::new();

        copy_or_default(inbound, &mut out, USER_AGENT, &self.default_user_agent);
        copy_or_default(
            inbound,
            &mut out,
            ACCEPT,
            &HeaderValue::from_static(DEFAULT_ACCEPT),
        );
        copy_or_default(
            inbound,
            &mut out,
            ACCEPT_LANGUAGE,
            &HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );

        for name in &self.extra_headers {
            for value in inbound.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }

        let host_value = header_value_or_unknown(hostname);
        out.insert(X_FORWARDED_HOST, host_value.clone());
        out.insert(X_ORIGINAL_HOST, host_value);
        out.insert(X_FORWARDED_PROTO, self.forwarded_proto.clone());

        let unknown = HeaderValue::from_static(UNKNOWN);
        copy_or_default(inbound, &mut out, X_FORWARDED_FOR, &unknown);
        copy_or_default(inbound, &mut out, X_REAL_IP, &unknown);

        out.insert(X_EDGE_PROXY, HeaderValue::from_static("true"));
        out.insert(X_PROXY_VERSION, self.version.clone());
        out.insert(
            X_PROXY_TIMESTAMP,
            header_value_or_unknown(&iso_timestamp(now)),
        );
        out.insert(HOST, self.upstream_host.clone());

        out
    }

    /// Headers for a 2xx (or 3xx without `Location`) passthrough response.
    pub fn success_headers(
        &self,
        upstream: &HeaderMap,
        hostname: &str,
        now: DateTime<Utc>,
    ) -> HeaderMap {
        let mut out = HeaderMap::new();

        out.insert(
            CONTENT_TYPE,
            upstream
                .get(CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
        );
        insert_cors_headers(&mut out);
        out.insert(
            CACHE_CONTROL,
            upstream
                .get(CACHE_CONTROL)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CACHE_CONTROL)),
        );
        out.insert(X_POWERED_BY, self.powered_by.clone());
        out.insert(X_PROXY_HOST, header_value_or_unknown(hostname));
        out.insert(X_RESPONSE_TIME, header_value_or_unknown(&iso_timestamp(now)));

        out
    }
}

/// The permissive CORS triple.
pub fn insert_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

fn copy_or_default(
    inbound: &HeaderMap,
    out: &mut HeaderMap,
    name: HeaderName,
    default: &HeaderValue,
) {
    let mut values = inbound.get_all(&name).iter().peekable();
    if values.peek().is_none() {
        out.insert(name, default.clone());
        return;
    }
    for value in values {
        out.append(name.clone(), value.clone());
    }
}

fn header_value_or_unknown(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(UNKNOWN))
}
