//! Metrics helpers for the forwarder.
//!
//! Thin wrappers around the `metrics` crate macros. No exporter is embedded; the
//! embedding application installs whatever recorder it wants and these calls are
//! no-ops until then.
//!
//! Provided metrics:
//! * `edge_forwarder_requests_total` (counter, labels: route, status)
//! * `edge_forwarder_request_duration_seconds` (histogram, labels: route)
//! * `edge_forwarder_upstream_requests_total` (counter, labels: outcome, status)
//! * `edge_forwarder_upstream_request_duration_seconds` (histogram, labels: method)
//! * `edge_forwarder_active_requests` (gauge)
//!
//! The timers record on `Drop`, so early returns and cancelled requests are still measured.
use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::{Duration, Instant},
};

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::Lazy;

pub const EDGE_FORWARDER_REQUESTS_TOTAL: &str = "edge_forwarder_requests_total";
pub const EDGE_FORWARDER_REQUEST_DURATION_SECONDS: &str =
    "edge_forwarder_request_duration_seconds";
pub const EDGE_FORWARDER_UPSTREAM_REQUESTS_TOTAL: &str = "edge_forwarder_upstream_requests_total";
pub const EDGE_FORWARDER_UPSTREAM_REQUEST_DURATION_SECONDS: &str =
    "edge_forwarder_upstream_request_duration_seconds";
pub const EDGE_FORWARDER_ACTIVE_REQUESTS: &str = "edge_forwarder_active_requests";

/// In-flight inbound requests; forced once to register metric descriptions.
static ACTIVE_REQUESTS: Lazy<AtomicI64> = Lazy::new(|| {
    describe_counter!(
        EDGE_FORWARDER_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of inbound requests answered by the forwarder."
    );
    describe_histogram!(
        EDGE_FORWARDER_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of inbound requests, including the upstream round trip."
    );
    describe_counter!(
        EDGE_FORWARDER_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Upstream round trips by outcome (redirect, passthrough, failure, error)."
    );
    describe_histogram!(
        EDGE_FORWARDER_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time until the upstream answered with response headers."
    );
    describe_gauge!(
        EDGE_FORWARDER_ACTIVE_REQUESTS,
        "Number of inbound requests currently being processed."
    );

    AtomicI64::new(0)
});

/// Count an answered inbound request.
pub fn increment_request_total(route: &str, status: u16) {
    counter!(
        EDGE_FORWARDER_REQUESTS_TOTAL,
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(route: &str, duration: Duration) {
    histogram!(
        EDGE_FORWARDER_REQUEST_DURATION_SECONDS,
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Count an upstream round trip. `outcome` is `error` when no upstream status was received.
pub fn increment_upstream_request_total(outcome: &str, status: u16) {
    counter!(
        EDGE_FORWARDER_UPSTREAM_REQUESTS_TOTAL,
        "outcome" => outcome.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_upstream_request_duration(method: &str, duration: Duration) {
    histogram!(
        EDGE_FORWARDER_UPSTREAM_REQUEST_DURATION_SECONDS,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Current number of in-flight inbound requests.
pub fn active_requests() -> i64 {
    ACTIVE_REQUESTS.load(Ordering::Relaxed)
}

/// RAII helper measuring inbound request duration and the active-request gauge.
pub struct RequestTimer {
    start: Instant,
    route: &'static str,
}

impl RequestTimer {
    pub fn new(route: &'static str) -> Self {
        let active = ACTIVE_REQUESTS.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!(EDGE_FORWARDER_ACTIVE_REQUESTS).set(active as f64);
        Self {
            start: Instant::now(),
            route,
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let active = ACTIVE_REQUESTS.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!(EDGE_FORWARDER_ACTIVE_REQUESTS).set(active as f64);
        record_request_duration(self.route, self.start.elapsed());
    }
}

/// RAII helper measuring upstream round-trip duration.
pub struct UpstreamRequestTimer {
    start: Instant,
    method: String,
}

impl UpstreamRequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }
}

impl Drop for UpstreamRequestTimer {
    fn drop(&mut self) {
        record_upstream_request_duration(&self.method, self.start.elapsed());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing edge-forwarder metrics");
    Lazy::force(&ACTIVE_REQUESTS);
    Ok(())
}
