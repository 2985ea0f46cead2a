//! HTTP client construction.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};

use crate::config::{Config, Platform};

/// Default user agent for the application.
pub const USER_AGENT: &str = concat!("dealboard-auth/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client wrapper.
///
/// Provides the standard configuration (User-Agent, timeouts, gateway-bypass
/// header) and, for the web platform, a cookie jar that carries the backend's
/// HTTP-only session cookie across requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Create a client configured from the `[api]` section.
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::builder()
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_secs))
            .request_timeout(Duration::from_secs(config.api.request_timeout_secs))
            .cookie_store(config.api.platform == Platform::Web);
        if let Some((name, value)) = config.gateway_header() {
            builder = builder.default_header(name, value);
        }
        builder.build()
    }

    /// Get the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Consume the wrapper, returning the reqwest client.
    pub fn into_inner(self) -> Client {
        self.inner
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    builder: ClientBuilder,
    headers: HeaderMap,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            builder: Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT),
            headers: HeaderMap::new(),
        }
    }
}

impl HttpClientBuilder {
    /// Set a custom user agent.
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.builder = self.builder.user_agent(ua);
        self
    }

    /// Set connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.connect_timeout(timeout);
        self
    }

    /// Set request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    /// Keep cookies set by the backend and send them back on later requests.
    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.builder = self.builder.cookie_store(enabled);
        self
    }

    /// Add a header sent with every request unless the request sets it itself.
    ///
    /// Invalid names or values are logged and skipped.
    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Ignoring invalid default header"),
        }
        self
    }

    /// Build the client.
    pub fn build(self) -> HttpClient {
        let inner = match self.builder.default_headers(self.headers).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client with custom config: {}; using defaults", e);
                Client::default()
            }
        };
        HttpClient { inner }
    }
}
