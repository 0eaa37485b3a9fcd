use std::net::SocketAddr;

use eyre::Result;
use http::HeaderName;
use tracing_subscriber::EnvFilter;

use crate::{
    config::models::{ForwarderConfig, ForwardingConfig, LimitsConfig, UpstreamConfig},
    core::headers::is_synthesized_header,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Forwarder configuration validator
pub struct ForwarderConfigValidator;

impl ForwarderConfigValidator {
    /// Validate the entire configuration, reporting every problem at once
    pub fn validate(config: &ForwarderConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(mut upstream_errors) = Self::validate_upstream(&config.upstream) {
            errors.append(&mut upstream_errors);
        }

        if let Err(mut forwarding_errors) = Self::validate_forwarding(&config.forwarding) {
            errors.append(&mut forwarding_errors);
        }

        if let Err(mut limit_errors) = Self::validate_limits(&config.limits) {
            errors.append(&mut limit_errors);
        }

        if let Err(e) = EnvFilter::try_new(&config.logging.level) {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_upstream(config: &UpstreamConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.base_url.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "upstream.base_url".to_string(),
            });
        } else if let Err(e) = Self::validate_url(&config.base_url, "upstream.base_url") {
            errors.push(e);
        }

        for (field, value) in [
            ("upstream.timeout", &config.timeout),
            ("upstream.connect_timeout", &config.connect_timeout),
            ("upstream.pool_idle_timeout", &config.pool_idle_timeout),
        ] {
            if let Err(e) = Self::validate_duration(field, value) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.query().is_some() || url.fragment().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Base URL must not carry a query string or fragment"
                            .to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL '{url_str}': {e}"),
            }),
        }
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(duration) if duration.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Duration must be greater than zero".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{value}': {e} (use units like 500ms, 10s, 1m)"),
            }),
        }
    }

    fn validate_forwarding(config: &ForwardingConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for name in &config.extra_headers {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(header) if is_synthesized_header(&header) => {
                    errors.push(ValidationError::InvalidField {
                        field: "forwarding.extra_headers".to_string(),
                        message: format!("'{name}' is set by the proxy and cannot be passed through"),
                    });
                }
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::InvalidField {
                    field: "forwarding.extra_headers".to_string(),
                    message: format!("'{name}' is not a valid header name"),
                }),
            }
        }

        if config.forwarded_proto.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "forwarding.forwarded_proto".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_limits(config: &LimitsConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "limits.max_body_bytes".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }
        if config.max_concurrent_upstream == 0 {
            errors.push(ValidationError::InvalidField {
                field: "limits.max_concurrent_upstream".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
