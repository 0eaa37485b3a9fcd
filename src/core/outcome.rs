use http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION};

/// What the forwarder does with an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    /// 3xx with `Location`: redirect the client with the same status and location.
    Redirect {
        status: StatusCode,
        location: HeaderValue,
    },
    /// 2xx, or 3xx without `Location`: relay status and body with decorated headers.
    Passthrough { status: StatusCode },
    /// Anything else: render the error page with the upstream status.
    Failure { status: StatusCode },
}

impl UpstreamOutcome {
    pub fn classify(status: StatusCode, headers: &HeaderMap) -> Self {
        if status.is_redirection() {
            return match headers.get(LOCATION) {
                Some(location) => UpstreamOutcome::Redirect {
                    status,
                    location: location.clone(),
                },
                // Redirect without a target still carries a body worth relaying.
                None => UpstreamOutcome::Passthrough { status },
            };
        }

        if status.is_success() {
            UpstreamOutcome::Passthrough { status }
        } else {
            UpstreamOutcome::Failure { status }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamOutcome::Redirect { status, .. }
            | UpstreamOutcome::Passthrough { status }
            | UpstreamOutcome::Failure { status } => *status,
        }
    }

    /// Label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamOutcome::Redirect { .. } => "redirect",
            UpstreamOutcome::Passthrough { .. } => "passthrough",
            UpstreamOutcome::Failure { .. } => "failure",
        }
    }
}
