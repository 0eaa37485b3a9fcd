use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` wins over the configured level.
fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}")),
    }
}

/// Initialize logging from the `[logging]` section.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&config.level, config.format == LogFormat::Json, true)
}

/// Initialize tracing with explicit settings
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter = env_filter(level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let result = if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
    };
    result.wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized with level: {}, json: {}, spans: {}",
        level,
        json_format,
        include_spans
    );
    Ok(())
}

/// Console logging for the one-shot CLI commands (`validate`, `init`).
pub fn init_console_tracing() -> Result<()> {
    init_tracing_with_config("info", false, false)
}

/// Create a request-scoped tracing span
pub fn create_request_span(
    method: &str,
    host: &str,
    path: &str,
    route: &str,
    request_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.host = host,
        http.path = path,
        route = route,
        request.id = request_id,
        client.addr = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_with_config() {
        // A second global install fails; either outcome is fine across test order.
        let _ = init_tracing_with_config("debug", true, true);
    }

    #[test]
    fn test_create_request_span() {
        let span = create_request_span("GET", "go.customer.com", "/abc", "forward", "req-123");
        assert_eq!(span.metadata().map(|m| m.name()), Some("request"));
    }
}
