use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    body::Body as AxumBody,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
};
use chrono::Utc;
use hyper::{Request, Response};
use serde::Serialize;
use tracing::Instrument;

use crate::{
    core::{
        ForwarderService,
        classifier::{Route, classify},
        headers::{X_POWERED_BY, inbound_hostname, insert_cors_headers, iso_timestamp},
    },
    metrics::{RequestTimer, increment_request_total},
    ports::http_server::RequestHandler,
    tracing_setup::create_request_span,
};

#[derive(Serialize)]
struct HealthReport<'a> {
    status: &'static str,
    proxy: &'a str,
    timestamp: String,
    hostname: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugReport<'a> {
    timestamp: String,
    hostname: &'a str,
    pathname: &'a str,
    search: String,
    method: &'a str,
    headers: BTreeMap<String, String>,
    backend_url: &'a str,
    proxy_type: &'a str,
}

/// HTTP handler for the edge forwarder: health, debug, preflight and forward.
pub struct HttpHandler {
    forwarder: Arc<ForwarderService>,
}

impl HttpHandler {
    pub fn new(forwarder: Arc<ForwarderService>) -> Self {
        Self { forwarder }
    }

    pub fn forwarder(&self) -> &ForwarderService {
        &self.forwarder
    }

    fn is_preflight(&self, method: &Method, route: Route) -> bool {
        route == Route::Forward
            && method == Method::OPTIONS
            && self.forwarder.config().cors.answer_preflight
    }

    async fn dispatch(
        &self,
        req: Request<AxumBody>,
        hostname: &str,
        route: Route,
    ) -> Response<AxumBody> {
        match route {
            Route::Health => self.health_response(hostname),
            Route::Debug => self.debug_response(&req, hostname),
            Route::Forward if self.is_preflight(req.method(), route) => self.preflight_response(),
            Route::Forward => self.forwarder.forward(req, hostname).await,
        }
    }

    fn health_response(&self, hostname: &str) -> Response<AxumBody> {
        let report = HealthReport {
            status: "healthy",
            proxy: &self.forwarder.config().identity.proxy_tag,
            timestamp: iso_timestamp(Utc::now()),
            hostname,
        };
        json_response(serde_json::to_string(&report), HeaderMap::new())
    }

    /// Echo what the forwarder would use for this request. Never contacts the upstream.
    fn debug_response(&self, req: &Request<AxumBody>, hostname: &str) -> Response<AxumBody> {
        let report = DebugReport {
            timestamp: iso_timestamp(Utc::now()),
            hostname,
            pathname: req.uri().path(),
            search: req
                .uri()
                .query()
                .map(|q| format!("?{q}"))
                .unwrap_or_default(),
            method: req.method().as_str(),
            headers: header_map_to_json(req.headers()),
            backend_url: self.forwarder.upstream().as_str(),
            proxy_type: &self.forwarder.config().identity.proxy_tag,
        };

        let mut extra = HeaderMap::new();
        extra.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        json_response(serde_json::to_string_pretty(&report), extra)
    }

    fn preflight_response(&self) -> Response<AxumBody> {
        let mut response = Response::new(AxumBody::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        insert_cors_headers(headers);
        headers.insert(
            X_POWERED_BY,
            self.forwarder.header_policy().powered_by().clone(),
        );
        response
    }
}

impl RequestHandler for HttpHandler {
    async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let hostname = inbound_hostname(req.uri(), req.headers());
        let route = classify(req.uri().path(), req.uri().query());
        let label = if self.is_preflight(req.method(), route) {
            "preflight"
        } else {
            route.as_str()
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        let span = create_request_span(
            req.method().as_str(),
            &hostname,
            req.uri().path(),
            label,
            &request_id,
        );
        if let Some(addr) = client_addr {
            span.record("client.addr", tracing::field::display(addr));
        }

        let _timer = RequestTimer::new(label);
        let start = Instant::now();
        let response = self
            .dispatch(req, &hostname, route)
            .instrument(span.clone())
            .await;

        let status = response.status().as_u16();
        span.record("http.status_code", status);
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        increment_request_total(label, status);

        response
    }
}

/// Flatten headers into a name -> value map; repeated headers are joined with ", ".
fn header_map_to_json(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

fn json_response(
    body: Result<String, serde_json::Error>,
    extra_headers: HeaderMap,
) -> Response<AxumBody> {
    let (status, body) = match body {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Failed to serialize JSON response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"serialization failed"}"#.to_string(),
            )
        }
    };

    let mut response = Response::new(AxumBody::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.extend(extra_headers);
    response
}
