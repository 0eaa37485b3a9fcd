//! HTML page shown for upstream failures and transport errors.
//!
//! Every interpolated value is escaped: hostname and path come straight from the client.

use axum::body::Body as AxumBody;
use chrono::{DateTime, Utc};
use http::{HeaderValue, Response, StatusCode, header::CONTENT_TYPE};

use crate::core::headers::{X_POWERED_BY, iso_timestamp};

pub const ERROR_PAGE_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const ERROR_HEADLINE: &str = "Link Not Found";
/// Detail message used when the upstream answered with a failure status.
pub const BACKEND_ERROR: &str = "Backend Error";

#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub hostname: String,
    pub path: String,
    pub status: StatusCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub home_url: String,
    pub brand: String,
}

impl ErrorPage {
    pub fn new(
        hostname: impl Into<String>,
        path: impl Into<String>,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            path: path.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
            home_url: "/".to_string(),
            brand: "Edge Forwarder".to_string(),
        }
    }

    /// Set the link-creation URL and product name shown on the page.
    pub fn with_identity(mut self, home_url: impl Into<String>, brand: impl Into<String>) -> Self {
        self.home_url = home_url.into();
        self.brand = brand.into();
        self
    }

    /// Short title for the `<title>` element, by status.
    pub fn title(&self) -> &'static str {
        match self.status.as_u16() {
            404 => "Link Not Found",
            500 => "Server Error",
            502 => "Backend Unavailable",
            503 => "Service Unavailable",
            _ => "Error",
        }
    }

    pub fn render(&self) -> String {
        let explanation = if self.status == StatusCode::NOT_FOUND {
            "doesn't exist or has expired"
        } else {
            "encountered an error"
        };

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title} - {brand}</title>
  <style>
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; text-align: center; padding: 50px; background: #f5f5f5; }}
    .container {{ max-width: 520px; margin: 0 auto; background: white; padding: 40px; border-radius: 10px; }}
    .icon {{ color: #e74c3c; font-size: 48px; margin-bottom: 20px; }}
    h1 {{ color: #2c3e50; margin-bottom: 20px; }}
    p {{ color: #7f8c8d; margin: 10px 0; }}
    .details {{ background: #ecf0f1; padding: 15px; border-radius: 5px; margin: 20px 0; text-align: left; font-family: Menlo, Monaco, monospace; font-size: 14px; }}
    ul {{ text-align: left; color: #7f8c8d; }}
    .footer {{ margin-top: 30px; font-size: 13px; opacity: 0.7; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="icon">&#128279;</div>
    <h1>{headline}</h1>
    <p>The short link you're looking for {explanation}.</p>
    <div class="details">
      <strong>Domain:</strong> {hostname}<br>
      <strong>Path:</strong> {path}<br>
      <strong>Status:</strong> {status}<br>
      <strong>Error:</strong> {message}<br>
      <strong>Time:</strong> {time}
    </div>
    <p>This might happen if:</p>
    <ul>
      <li>The link has expired or been deleted</li>
      <li>There's a typo in the URL</li>
      <li>The custom domain is still propagating (wait 5-10 minutes)</li>
      <li>The backend service is temporarily unavailable</li>
    </ul>
    <p><a href="{home_url}">Create your own short links</a></p>
    <div class="footer">Powered by <strong>{brand}</strong></div>
  </div>
</body>
</html>
"#,
            title = self.title(),
            brand = escape_html(&self.brand),
            headline = ERROR_HEADLINE,
            explanation = explanation,
            hostname = escape_html(&self.hostname),
            path = escape_html(&self.path),
            status = self.status.as_u16(),
            message = escape_html(&self.message),
            time = iso_timestamp(self.timestamp),
            home_url = escape_html(&self.home_url),
        )
    }

    /// Render into a response carrying the page's status and the identity header.
    pub fn into_response(self, powered_by: &HeaderValue) -> Response<AxumBody> {
        let mut response = Response::new(AxumBody::from(self.render()));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(ERROR_PAGE_CONTENT_TYPE),
        );
        headers.insert(X_POWERED_BY, powered_by.clone());
        response
    }
}

/// Minimal HTML escaping for text and attribute contexts.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
