//! Session configuration.
//!
//! A [`SessionConfig`] is constructed in code by the embedding game and handed
//! to [`CarrotSession::new`]. The app secret is wrapped in
//! [`secrecy::SecretString`] so it never appears in logs or serialized output.
//!
//! [`CarrotSession::new`]: crate::session::CarrotSession::new

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Default backend hostname.
pub const DEFAULT_HOSTNAME: &str = "gocarrot.com";

/// Configuration for a [`CarrotSession`].
///
/// [`CarrotSession`]: crate::session::CarrotSession
pub struct SessionConfig {
    /// Application identifier issued by the backend.
    pub app_id: String,

    /// Shared signing secret. Held in memory only; never persisted into the
    /// request cache and never logged.
    pub app_secret: SecretString,

    /// Backend hostname, optionally with a `:port` suffix. The port is
    /// stripped when building the sign string but kept for the request URL.
    pub hostname: String,

    /// Path of the on-disk request cache. `None` keeps the queue in memory
    /// for the lifetime of the process.
    pub cache_path: Option<PathBuf>,

    /// HTTP client knobs.
    pub http: HttpConfig,
}

impl SessionConfig {
    /// Creates a configuration with default hostname and HTTP settings.
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_secret: SecretString) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret,
            hostname: DEFAULT_HOSTNAME.to_string(),
            cache_path: None,
            http: HttpConfig::default(),
        }
    }

    /// Sets the backend hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the on-disk location of the request cache.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Replaces the HTTP client settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // app_secret is deliberately omitted.
        f.debug_struct("SessionConfig")
            .field("app_id", &self.app_id)
            .field("hostname", &self.hostname)
            .field("cache_path", &self.cache_path)
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection establishment timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Full round-trip timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Accept invalid TLS certificates. Off by default; intended only for
    /// pointing a build at a test environment with self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl HttpConfig {
    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

const fn default_connect_timeout_secs() -> u64 {
    15
}

const fn default_request_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_omits_the_secret() {
        let config = SessionConfig::new("app-1", SecretString::from("hunter2".to_string()));
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("app-1"));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = SessionConfig::new("app-1", SecretString::from("s".to_string()))
            .with_hostname("test.gocarrot.com:8080")
            .with_cache_path("/tmp/carrot.db");
        assert_eq!(config.hostname, "test.gocarrot.com:8080");
        assert!(config.cache_path.is_some());
        assert_eq!(config.http.request_timeout_secs, 60);
    }
}
