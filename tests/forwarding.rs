// End-to-end tests: the forwarder router in front of a real upstream on an ephemeral port
use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::Path,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    response::Response,
    routing::{any, get},
};
use edge_forwarder::{
    ForwarderServer, ForwarderService, GracefulShutdown, HttpClientAdapter, HttpHandler,
    config::{ForwarderConfig, LimitsConfig},
};
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt; // for oneshot

const CUSTOM_DOMAIN: &str = "go.customer.com";

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<serde_json::Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    Json(serde_json::json!({
        "method": method.as_str(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn redirect_with(Path(code): Path<u16>) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::from_u16(code).unwrap();
    response.headers_mut().insert(
        header::LOCATION,
        HeaderValue::from_static("https://example.com/target?utm=1"),
    );
    response
}

/// Stand-in for the link service.
async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route(
            "/abc123",
            get(|| async {
                (
                    StatusCode::FOUND,
                    [(header::LOCATION, "https://example.com/target")],
                    "redirecting",
                )
            }),
        )
        .route("/r/{code}", get(redirect_with))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "no such link") }))
        .route(
            "/broken",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        )
        .route(
            "/no-location",
            get(|| async { (StatusCode::FOUND, "nowhere to go") }),
        )
        .route(
            "/api/info",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "application/json"),
                        (header::SET_COOKIE, "upstream=secret"),
                    ],
                    r#"{"ok":true}"#,
                )
            }),
        )
        .route(
            "/plain",
            get(|| async { Response::new(Body::from("no content type")) }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .route("/echo", any(echo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn forwarder_router(config: ForwarderConfig) -> Router {
    let config = Arc::new(config);
    let client = Arc::new(HttpClientAdapter::new(&config.upstream).unwrap());
    let forwarder = Arc::new(ForwarderService::new(config, client).unwrap());
    let powered_by = forwarder.header_policy().powered_by().clone();
    let handler = Arc::new(HttpHandler::new(forwarder));
    ForwarderServer::new(
        "127.0.0.1:0".parse().unwrap(),
        handler,
        powered_by,
        Arc::new(GracefulShutdown::new()),
    )
    .router()
}

async fn router_for(upstream: SocketAddr) -> Router {
    forwarder_router(
        ForwarderConfig::builder()
            .upstream(format!("http://{upstream}"))
            .build()
            .unwrap(),
    )
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, CUSTOM_DOMAIN)
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_answers_without_upstream() {
    // Nothing listens on the upstream port.
    let app = forwarder_router(
        ForwarderConfig::builder()
            .upstream("http://127.0.0.1:9")
            .build()
            .unwrap(),
    );

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = body_string(response).await;
    assert!(body.contains(r#""status":"healthy""#));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_query_parameter_wins_on_any_path() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let response = app
        .oneshot(get_request("/abc123?debug&health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test(flavor = "multi_thread")]
async fn redirect_is_relayed_verbatim() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let response = app.oneshot(get_request("/abc123")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://example.com/target"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn every_redirect_code_is_preserved() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    for code in [301u16, 302, 307, 308] {
        let response = app
            .clone()
            .oneshot(get_request(&format!("/r/{code}")))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), code);
        assert_eq!(
            response.headers()[header::LOCATION].as_bytes(),
            b"https://example.com/target?utm=1"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_404_renders_link_not_found() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let response = app.oneshot(get_request("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    assert!(response.headers().contains_key("x-powered-by"));

    let html = body_string(response).await;
    assert!(html.contains("Link Not Found"));
    assert!(html.contains(CUSTOM_DOMAIN));
    assert!(html.contains("/missing"));
    assert!(html.contains("404"));
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_5xx_keeps_its_status() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let response = app.oneshot(get_request("/broken")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let html = body_string(response).await;
    assert!(html.contains("Link Not Found"));
    assert!(html.contains("503"));
    assert!(html.contains("Backend Error"));
}

#[tokio::test(flavor = "multi_thread")]
async fn redirect_without_location_passes_through() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let response = app.oneshot(get_request("/no-location")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(!response.headers().contains_key(header::LOCATION));
    assert_eq!(body_string(response).await, "nowhere to go");
}

#[tokio::test(flavor = "multi_thread")]
async fn success_carries_the_header_contract() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let response = app.oneshot(get_request("/api/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "GET, POST, PUT, DELETE, OPTIONS"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=300");
    assert!(headers.contains_key("x-powered-by"));
    assert_eq!(headers["x-proxy-host"], CUSTOM_DOMAIN);
    assert!(headers.contains_key("x-response-time"));
    assert!(!headers.contains_key(header::SET_COOKIE));

    assert_eq!(body_string(response).await, r#"{"ok":true}"#);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_content_type_defaults_to_html() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let response = app.oneshot(get_request("/plain")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
}

#[tokio::test(flavor = "multi_thread")]
async fn outbound_headers_follow_the_allow_list() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let request = Request::builder()
        .uri("/echo?x=1")
        .header(header::HOST, CUSTOM_DOMAIN)
        .header(header::USER_AGENT, "integration-test/1.0")
        .header(header::COOKIE, "session=secret")
        .header(header::AUTHORIZATION, "Bearer token")
        .header(header::REFERER, "https://social.example")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let echoed = body_json(response).await;
    let headers = &echoed["headers"];
    assert_eq!(headers["host"], upstream.to_string());
    assert_eq!(headers["user-agent"], "integration-test/1.0");
    assert_eq!(headers["x-forwarded-host"], CUSTOM_DOMAIN);
    assert_eq!(headers["x-original-host"], CUSTOM_DOMAIN);
    assert_eq!(headers["x-forwarded-proto"], "https");
    assert_eq!(headers["x-forwarded-for"], "203.0.113.7");
    assert_eq!(headers["x-real-ip"], "unknown");
    assert_eq!(headers["x-edge-proxy"], "true");
    assert!(headers.get("x-proxy-version").is_some());
    assert!(headers.get("x-proxy-timestamp").is_some());
    assert!(headers.get("cookie").is_none());
    assert!(headers.get("authorization").is_none());
    assert!(headers.get("referer").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn extra_headers_are_forwarded_when_configured() {
    let upstream = spawn_upstream().await;
    let app = forwarder_router(
        ForwarderConfig::builder()
            .upstream(format!("http://{upstream}"))
            .extra_header("referer")
            .build()
            .unwrap(),
    );

    let request = Request::builder()
        .uri("/echo")
        .header(header::HOST, CUSTOM_DOMAIN)
        .header(header::REFERER, "https://social.example")
        .body(Body::empty())
        .unwrap();
    let echoed = body_json(app.oneshot(request).await.unwrap()).await;
    assert_eq!(echoed["headers"]["referer"], "https://social.example");
}

#[tokio::test(flavor = "multi_thread")]
async fn request_body_and_method_are_forwarded() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .header(header::HOST, CUSTOM_DOMAIN)
        .body(Body::from(r#"{"url":"https://example.com"}"#))
        .unwrap();
    let echoed = body_json(app.oneshot(request).await.unwrap()).await;
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["body"], r#"{"url":"https://example.com"}"#);
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_body_gets_413() {
    let upstream = spawn_upstream().await;
    let app = forwarder_router(
        ForwarderConfig::builder()
            .upstream(format!("http://{upstream}"))
            .limits(LimitsConfig {
                max_body_bytes: 16,
                ..LimitsConfig::default()
            })
            .build()
            .unwrap(),
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .header(header::HOST, CUSTOM_DOMAIN)
        .body(Body::from(vec![b'x'; 1024]))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body_string(response).await.contains("Link Not Found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_upstream_gives_500_with_message() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let app = forwarder_router(
        ForwarderConfig::builder()
            .upstream(format!("http://127.0.0.1:{port}"))
            .build()
            .unwrap(),
    );

    let response = app.clone().oneshot(get_request("/abc123")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = body_string(response).await;
    assert!(html.contains("Link Not Found"));
    assert!(html.contains("Connection error"));
    assert!(html.contains("Connection refused"), "missing transport detail: {html}");

    // The failure is contained: the same router keeps answering.
    let response = app.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");

    let response = app.oneshot(get_request("/other")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("/other"));
}

/// Answers every request with headers and a partial body, then goes silent.
async fn spawn_stalling_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nabc")
                    .await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_upstream_body_is_aborted() {
    let upstream = spawn_stalling_upstream().await;
    let app = forwarder_router(
        ForwarderConfig::builder()
            .upstream(format!("http://{upstream}"))
            .timeout("200ms")
            .build()
            .unwrap(),
    );

    let response = app.oneshot(get_request("/abc123")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let collected = tokio::time::timeout(Duration::from_secs(3), response.into_body().collect())
        .await
        .expect("stalled body was never cut off");
    assert!(collected.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_upstream_times_out() {
    let upstream = spawn_upstream().await;
    let app = forwarder_router(
        ForwarderConfig::builder()
            .upstream(format!("http://{upstream}"))
            .timeout("200ms")
            .build()
            .unwrap(),
    );

    let started = std::time::Instant::now();
    let response = app.oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(body_string(response).await.contains("timed out"));
}

#[tokio::test(flavor = "multi_thread")]
async fn debug_reflects_configuration_and_is_stable() {
    let upstream = spawn_upstream().await;
    let app = router_for(upstream).await;
    let base_url = format!("http://{upstream}");

    let first = app.clone().oneshot(get_request("/debug")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let mut first = body_json(first).await;

    let mut second = body_json(app.oneshot(get_request("/debug")).await.unwrap()).await;

    assert_eq!(first["backendUrl"], base_url.as_str());
    assert_eq!(first["hostname"], CUSTOM_DOMAIN);

    first["timestamp"] = serde_json::Value::Null;
    second["timestamp"] = serde_json::Value::Null;
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread")]
async fn preflight_is_answered_locally_only_when_enabled() {
    let upstream = spawn_upstream().await;
    let app = forwarder_router(
        ForwarderConfig::builder()
            .upstream(format!("http://{upstream}"))
            .answer_preflight(true)
            .build()
            .unwrap(),
    );

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/abc123")
        .header(header::HOST, CUSTOM_DOMAIN)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    // Default configuration forwards OPTIONS like any other method.
    let app = router_for(upstream).await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/echo")
        .header(header::HOST, CUSTOM_DOMAIN)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["method"], "OPTIONS");
}
