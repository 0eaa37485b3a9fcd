//! Inbound request classification.
//!
//! Total over every (path, query) pair: each request is exactly one of
//! health, debug or forward. Health is checked first.

/// Paths answered by the health responder.
pub const HEALTH_PATHS: [&str; 2] = ["/health", "/_health"];
/// Paths answered by the debug responder.
pub const DEBUG_PATHS: [&str; 2] = ["/debug", "/_debug"];
/// Query parameter that selects the health responder on any path.
pub const HEALTH_PARAM: &str = "health";
/// Query parameter that selects the debug responder on any path.
pub const DEBUG_PARAM: &str = "debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Health,
    Debug,
    Forward,
}

impl Route {
    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Health => "health",
            Route::Debug => "debug",
            Route::Forward => "forward",
        }
    }
}

/// Classify a request by path and raw query string. Parameters match by presence, not value.
pub fn classify(path: &str, query: Option<&str>) -> Route {
    if HEALTH_PATHS.contains(&path) || has_query_param(query, HEALTH_PARAM) {
        Route::Health
    } else if DEBUG_PATHS.contains(&path) || has_query_param(query, DEBUG_PARAM) {
        Route::Debug
    } else {
        Route::Forward
    }
}

/// True when `name` appears as a key in the query string (`?name`, `?name=`, `?name=x`).
pub fn has_query_param(query: Option<&str>, name: &str) -> bool {
    query.is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes()).any(|(key, _)| key == name)
    })
}
