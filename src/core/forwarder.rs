//! Upstream round trip and response mapping.
//!
//! `ForwarderService` owns everything that is fixed for the process lifetime (the
//! upstream target, header policy, limits) and turns one inbound request into exactly
//! one client response. It never returns an error: upstream failures, transport
//! failures and oversized bodies all become a rendered error page.
use std::{sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use chrono::Utc;
use eyre::{Result, WrapErr};
use http::{
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri,
    header::{CONTENT_LENGTH, LOCATION},
    request::Parts,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::{
    config::ForwarderConfig,
    core::{
        error_page::{BACKEND_ERROR, ErrorPage},
        headers::HeaderPolicy,
        outcome::UpstreamOutcome,
        upstream::{UpstreamError, UpstreamTarget},
    },
    metrics::{UpstreamRequestTimer, increment_upstream_request_total},
    ports::http_client::{HttpClient, HttpClientError},
    utils::IdleTimeoutBody,
};

/// Failures that end the forward path before an upstream status is known.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ForwardError {
    #[error("Request body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error(transparent)]
    Target(#[from] UpstreamError),

    #[error(transparent)]
    Upstream(#[from] HttpClientError),
}

impl ForwardError {
    /// Status shown to the client. Transport and target problems are always 500.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ForwardError::Target(_) | ForwardError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub struct ForwarderService {
    config: Arc<ForwarderConfig>,
    upstream: UpstreamTarget,
    headers: HeaderPolicy,
    client: Arc<dyn HttpClient>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ForwarderService {
    /// Build the forwarder from validated configuration and an upstream client.
    pub fn new(config: Arc<ForwarderConfig>, client: Arc<dyn HttpClient>) -> Result<Self> {
        let upstream = UpstreamTarget::parse(&config.upstream.base_url)
            .wrap_err("Invalid upstream.base_url")?;
        let headers = HeaderPolicy::new(&config, &upstream)?;
        let timeout = config
            .upstream
            .timeout_duration()
            .wrap_err_with(|| format!("Invalid upstream.timeout '{}'", config.upstream.timeout))?;
        let permits = Arc::new(Semaphore::new(config.limits.max_concurrent_upstream.max(1)));

        Ok(Self {
            config,
            upstream,
            headers,
            client,
            permits,
            timeout,
        })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn upstream(&self) -> &UpstreamTarget {
        &self.upstream
    }

    pub fn header_policy(&self) -> &HeaderPolicy {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Round-trip `req` to the upstream and map the result to a client response.
    pub async fn forward(&self, req: Request<AxumBody>, hostname: &str) -> Response<AxumBody> {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();

        match self.try_forward(parts, body, hostname).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    ForwardError::Upstream(_) | ForwardError::Target(_) => {
                        tracing::error!(host = %hostname, path = %path, "Proxy error: {}", e)
                    }
                    _ => tracing::warn!(host = %hostname, path = %path, "Rejected request: {}", e),
                }
                increment_upstream_request_total("error", e.status().as_u16());
                self.error_page(hostname, &path, e.status(), e.to_string())
            }
        }
    }

    /// Render the error page with this forwarder's identity.
    pub fn error_page(
        &self,
        hostname: &str,
        path: &str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Response<AxumBody> {
        ErrorPage::new(hostname, path, status, message)
            .with_identity(&self.config.identity.home_url, &self.config.identity.brand)
            .into_response(self.headers.powered_by())
    }

    async fn try_forward(
        &self,
        parts: Parts,
        body: AxumBody,
        hostname: &str,
    ) -> Result<Response<AxumBody>, ForwardError> {
        let target = self
            .upstream
            .target_uri(parts.uri.path(), parts.uri.query())?;

        let body = self.read_body(&parts, body).await?;
        let headers = self
            .headers
            .outbound_headers(&parts.headers, hostname, Utc::now());

        tracing::info!(
            host = %hostname,
            "Proxying {} {}{} -> {}",
            parts.method,
            hostname,
            parts.uri.path(),
            target
        );

        let timer = UpstreamRequestTimer::new(parts.method.as_str());
        let response = tokio::time::timeout(
            self.timeout,
            self.dispatch(&parts.method, &target, &headers, body),
        )
        .await
        .map_err(|_| HttpClientError::Timeout(self.timeout))??;
        drop(timer);

        let (upstream_parts, upstream_body) = response.into_parts();
        let outcome = UpstreamOutcome::classify(upstream_parts.status, &upstream_parts.headers);
        increment_upstream_request_total(outcome.kind(), outcome.status().as_u16());
        tracing::info!(
            status = outcome.status().as_u16(),
            outcome = outcome.kind(),
            "Backend response: {}",
            outcome.status()
        );

        let response = match outcome {
            UpstreamOutcome::Redirect { status, location } => {
                tracing::info!("Redirecting to: {:?}", location);
                redirect_response(status, location)
            }
            UpstreamOutcome::Passthrough { status } => {
                // The dispatch timeout ends with the headers; the body gets an idle limit instead.
                let body = AxumBody::new(IdleTimeoutBody::new(upstream_body, self.timeout));
                let mut response = Response::new(body);
                *response.status_mut() = status;
                *response.headers_mut() =
                    self.headers
                        .success_headers(&upstream_parts.headers, hostname, Utc::now());
                response
            }
            UpstreamOutcome::Failure { status } => {
                tracing::warn!(host = %hostname, "Backend error: {}", status);
                self.error_page(hostname, parts.uri.path(), status, BACKEND_ERROR)
            }
        };

        Ok(response)
    }

    /// GET/HEAD never carry a body upstream; everything else is buffered up to the cap.
    async fn read_body(&self, parts: &Parts, body: AxumBody) -> Result<Option<Bytes>, ForwardError> {
        if parts.method == Method::GET || parts.method == Method::HEAD {
            return Ok(None);
        }

        let limit = self.config.limits.max_body_bytes;
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit as u64) {
            return Err(ForwardError::BodyTooLarge { limit });
        }

        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(Some(collected.to_bytes())),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(ForwardError::BodyTooLarge { limit })
            }
            Err(e) => Err(ForwardError::BodyRead(e.to_string())),
        }
    }

    async fn dispatch(
        &self,
        method: &Method,
        target: &Uri,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Response<AxumBody>, HttpClientError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| HttpClientError::Request(format!("Upstream permits closed: {e}")))?;

        let retries = self.config.upstream.connect_retries;
        let mut attempt = 0;
        loop {
            let mut request = Request::new(match &body {
                Some(bytes) => AxumBody::from(bytes.clone()),
                None => AxumBody::empty(),
            });
            *request.method_mut() = method.clone();
            *request.uri_mut() = target.clone();
            *request.headers_mut() = headers.clone();

            match self.client.send_request(request).await {
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = retries,
                        "Upstream connection failed, retrying: {}",
                        e
                    );
                }
                result => return result,
            }
        }
    }
}

fn redirect_response(status: StatusCode, location: HeaderValue) -> Response<AxumBody> {
    let mut response = Response::new(AxumBody::empty());
    *response.status_mut() = status;
    response.headers_mut().insert(LOCATION, location);
    response
}
