use std::error::Error as StdError;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::{Result, WrapErr};
use hyper::{Request, Response, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::{
    config::UpstreamConfig,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

/// Upstream client using Hyper with Rustls.
///
/// * Sends exactly the headers it is given; header policy lives in the core
/// * Never follows redirects, so 3xx responses reach the forwarder untouched
/// * Splits failures into connect errors (safe to retry) and request errors
/// * Converts between Hyper body and Axum body types
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let connect_timeout = config.connect_timeout_duration().wrap_err_with(|| {
            format!("Invalid upstream.connect_timeout '{}'", config.connect_timeout)
        })?;
        let pool_idle_timeout = config.pool_idle_timeout_duration().wrap_err_with(|| {
            format!(
                "Invalid upstream.pool_idle_timeout '{}'",
                config.pool_idle_timeout
            )
        })?;

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_connect_timeout(Some(connect_timeout));
        http_connector.set_nodelay(true);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle_timeout)
            .build::<_, AxumBody>(https_connector);

        tracing::info!(
            connect_timeout = ?connect_timeout,
            pool_idle_timeout = ?pool_idle_timeout,
            "Created upstream HTTP client"
        );
        Ok(Self { client })
    }
}

/// Message of `err` followed by its source chain, e.g.
/// `client error (Connect): tcp connect error: Connection refused (os error 111)`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn classify_error(err: &hyper_util::client::legacy::Error) -> HttpClientError {
    let message = error_chain(err);
    if err.is_connect() {
        HttpClientError::Connect(message)
    } else {
        HttpClientError::Request(message)
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        if req.uri().host().is_none() {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(format!(
                "Outgoing URI has no host: {}",
                req.uri()
            )));
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;

        let span = tracing::debug_span!(
            "upstream_request",
            http.method = %parts.method,
            http.url = %parts.uri,
            http.status_code = tracing::field::Empty,
        );
        tracing::debug!(parent: &span, "Outgoing request headers: {:?}", parts.headers);

        let outgoing = Request::from_parts(parts, body);
        match self.client.request(outgoing).instrument(span.clone()).await {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();
                // The body is re-framed by the serving side.
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                let err = classify_error(&e);
                tracing::debug!(parent: &span, "Upstream request failed: {}", err);
                Err(err)
            }
        }
    }
}
