//! Shared networking infrastructure.

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};

use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use crate::error::{AuthError, Result};

/// The backend origin paired with the HTTP client used to reach it.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Create an API client for `base_url`.
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| AuthError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(AuthError::Config(format!(
                "Base URL '{}' cannot carry a path",
                base_url
            )));
        }
        Ok(Self { http, base })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve `path` against the origin. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path)
                .map_err(|e| AuthError::Config(format!("Invalid URL '{}': {}", path, e)));
        }
        self.base
            .join(path)
            .map_err(|e| AuthError::Config(format!("Invalid path '{}': {}", path, e)))
    }

    /// Start a request to `path` on the backend.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.http.request(method, self.url(path)?))
    }

    pub fn get(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::POST, path)
    }
}

/// Turn a non-success response into [`AuthError::Api`].
///
/// Uses the JSON `message` (or `error`) field when present, the raw body
/// text otherwise.
pub async fn api_error(response: Response) -> AuthError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or(body);
    AuthError::Api { status, message }
}
