//! Authenticated requests.
//!
//! [`AuthFetch::fetch`] attaches a bearer token that is known to be
//! unexpired, refreshing it beforehand when needed. A 401 from the target
//! endpoint is returned to the caller as-is: only the pre-flight expiry
//! check triggers a refresh.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use tracing::{debug, warn};

use super::refresh::Refresher;
use super::store::TokenStore;
use crate::error::{AuthError, RefreshError, Result, SessionError};
use crate::net::ApiClient;
use crate::session::SessionStore;

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Text(String),
}

/// Method, headers, query and body for one request.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl FetchOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Set a header, replacing any earlier value. Invalid pairs are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "Ignoring invalid request header"),
        }
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    /// Start a request on `api` with these options applied.
    pub(crate) fn build(self, api: &ApiClient, url: &str) -> Result<RequestBuilder> {
        let mut request = api.request(self.method, url)?.headers(self.headers);
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        Ok(match self.body {
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::Form(fields)) => request.form(&fields),
            Some(RequestBody::Text(text)) => request.body(text),
            None => request,
        })
    }
}

/// Sends requests with a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthFetch {
    api: ApiClient,
    refresher: Arc<Refresher>,
    store: TokenStore,
    session: SessionStore,
}

impl AuthFetch {
    pub fn new(
        api: ApiClient,
        refresher: Arc<Refresher>,
        store: TokenStore,
        session: SessionStore,
    ) -> Self {
        Self {
            api,
            refresher,
            store,
            session,
        }
    }

    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    /// Send one request to `url` (a path on the backend or an absolute URL).
    ///
    /// Header precedence: client defaults, then caller headers, then
    /// `Authorization`, which always carries the token obtained here.
    ///
    /// `url` is never contacted without a valid token. When the refresh
    /// token is missing or rejected the stored credentials are torn down
    /// and [`AuthError::NoValidToken`] is returned. When the refresh endpoint
    /// is unreachable or failing, [`AuthError::Refresh`] is returned and the
    /// credentials and session user stay in place.
    pub async fn fetch(&self, url: &str, mut options: FetchOptions) -> Result<Response> {
        let token = match self.refresher.valid_access_token().await {
            Ok(token) => token,
            Err(e) if e.is_terminal() => {
                warn!(error = %e, url, "No usable access token");
                invalidate(&self.store, &self.session, e).await;
                return Err(AuthError::NoValidToken);
            }
            Err(e) => {
                warn!(error = %e, url, "Token refresh unavailable; keeping credentials");
                return Err(AuthError::Refresh(e));
            }
        };

        options.headers.remove(AUTHORIZATION);
        let method = options.method.clone();
        let request = options.build(&self.api, url)?.bearer_auth(token);

        debug!(%method, url, "Sending authenticated request");
        Ok(request.send().await?)
    }
}

/// Delete both tokens and clear the session user after a failed refresh.
pub(crate) async fn invalidate(store: &TokenStore, session: &SessionStore, reason: RefreshError) {
    store.clear().await;
    session.invalidate(Some(SessionError::Refresh(reason)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ApiClient {
        ApiClient::new(reqwest::Client::new(), "http://127.0.0.1:9").unwrap()
    }

    #[test]
    fn test_options_builders() {
        let opts = FetchOptions::post()
            .header("X-Trace", "1")
            .header("X-Trace", "2")
            .query("page", 3)
            .json(serde_json::json!({ "a": 1 }));
        assert_eq!(opts.method, Method::POST);
        assert_eq!(opts.headers.get("x-trace").unwrap(), "2");
        assert_eq!(opts.query, vec![("page".to_string(), "3".to_string())]);
        assert!(matches!(opts.body, Some(RequestBody::Json(_))));
    }

    #[test]
    fn test_build_applies_query_and_headers() {
        let request = FetchOptions::get()
            .header("Accept", "application/json")
            .query("size", 20)
            .build(&api(), "/api/deals/mine")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://127.0.0.1:9/api/deals/mine?size=20");
        assert_eq!(request.headers().get("accept").unwrap(), "application/json");
    }

    #[test]
    fn test_build_form_body() {
        let request = FetchOptions::post()
            .form(vec![("code".into(), "abc".into())])
            .build(&api(), "/api/auth/token")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("content-type").unwrap(),
            "application/x-www-form-urlencoded"
        );
    }
}
