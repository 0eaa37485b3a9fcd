use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// The connection to the upstream could not be established; nothing was sent
    #[error("Connection error: {0}")]
    Connect(String),

    /// The request failed after the connection was up (reset, malformed response ...)
    #[error("Request error: {0}")]
    Request(String),

    /// Error when request times out
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpClientError {
    /// Only failures where the request provably never left the proxy may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HttpClientError::Connect(_))
    }
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to the upstream
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to the upstream
    ///
    /// # Arguments
    /// * `req` - The fully built outbound request (absolute URI, final headers)
    ///
    /// # Returns
    /// A future that resolves to the upstream's response or an error. The response
    /// body is streamed; callers decide whether to read it.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
