//! HTTP transport seam.
//!
//! The session speaks to the backend through the [`Transport`] trait so tests
//! can substitute a scripted double and platform ports can bring their own
//! HTTP stack. [`HttpTransport`] is the production implementation.
//!
//! The transport owns URL encoding of the form body; form field values arrive
//! here exactly as they were signed.

use std::time::Duration;

use thiserror::Error;

use crate::config::HttpConfig;

/// Errors from the HTTP transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The HTTP client could not be initialized.
    #[error("client initialization failed: {0}")]
    Init(String),

    /// The request could not be sent or the reply could not be read.
    #[error("http error: {message}")]
    Http {
        /// What went wrong.
        message: String,
    },
}

/// One outgoing backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// Hostname, optionally with a `:port` suffix; used verbatim in the URL.
    pub host: String,

    /// Backend path, e.g. `/me/achievements.json`.
    pub path: String,

    /// Ordered form fields, signed where applicable, `sig` last.
    pub fields: Vec<(String, String)>,

    /// Raw image bytes for the multipart side-channel, when present.
    pub image_bytes: Option<Vec<u8>>,
}

impl WireRequest {
    /// The full request URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("https://{}{}", self.host, self.path)
    }
}

/// A backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireReply {
    /// HTTP status code.
    pub status: u16,

    /// Response body; success replies are JSON objects with a `code` field
    /// equal to the HTTP status.
    pub body: String,
}

/// Capability the dispatcher needs from the platform: POST a request, get a
/// status code and body back.
pub trait Transport: Send + Sync {
    /// Performs the request, returning the reply for any HTTP status.
    ///
    /// # Errors
    ///
    /// Returns an error only when no HTTP reply was obtained at all
    /// (connection refused, timeout, TLS failure).
    fn send(&self, request: &WireRequest) -> Result<WireReply, TransportError>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}

/// Production transport over a blocking HTTP client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Builds the client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be initialized.
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout());

        if config.accept_invalid_certs {
            // Explicit opt-in for test environments with self-signed certs.
            tracing::warn!("TLS certificate validation is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|err| TransportError::Init(err.to_string()))?;
        Ok(Self { client })
    }

    /// Builds the client with default settings and a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let config = HttpConfig {
            request_timeout_secs: timeout.as_secs(),
            ..HttpConfig::default()
        };
        Self::new(&config)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &WireRequest) -> Result<WireReply, TransportError> {
        let builder = self.client.post(request.url());

        let builder = if let Some(image_bytes) = &request.image_bytes {
            let mut form = reqwest::blocking::multipart::Form::new();
            for (key, value) in &request.fields {
                form = form.text(key.clone(), value.clone());
            }
            form = form.part(
                "image_bytes",
                reqwest::blocking::multipart::Part::bytes(image_bytes.clone()),
            );
            builder.multipart(form)
        } else {
            builder.form(&request.fields)
        };

        let response = builder.send().map_err(|err| TransportError::Http {
            message: err.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Ok(WireReply { status, body })
    }

    fn name(&self) -> &'static str {
        "https"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_host_and_path() {
        let request = WireRequest {
            host: "gocarrot.com:8080".to_string(),
            path: "/me/like.json".to_string(),
            fields: Vec::new(),
            image_bytes: None,
        };
        assert_eq!(request.url(), "https://gocarrot.com:8080/me/like.json");
    }

    #[test]
    fn http_transport_builds_with_defaults() {
        let transport = HttpTransport::new(&HttpConfig::default()).expect("client");
        assert_eq!(transport.name(), "https");
    }
}
