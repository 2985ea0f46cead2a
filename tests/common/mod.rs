#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dealboard_auth::auth::jwt::now_seconds;
use dealboard_auth::auth::{REFRESH_TOKEN_KEY, TOKEN_KEY, TokenStore};
use dealboard_auth::session::Navigator;
use dealboard_auth::{Platform, Route, SessionClient};

/// Build an unsigned JWT carrying `claims`.
pub fn mint(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// Access token for `email` expiring `ttl` seconds from now (negative for
/// already expired).
pub fn access_token(email: &str, ttl: i64) -> String {
    mint(json!({
        "sub": "1",
        "email": email,
        "name": "Test User",
        "provider": "LOCAL",
        "exp": now_seconds() + ttl,
        "onboardingCompleted": false
    }))
}

pub async fn seeded_store(access: Option<&str>, refresh: Option<&str>) -> TokenStore {
    let store = TokenStore::in_memory();
    if let Some(token) = access {
        store.save(TOKEN_KEY, token).await.unwrap();
    }
    if let Some(token) = refresh {
        store.save(REFRESH_TOKEN_KEY, token).await.unwrap();
    }
    store
}

pub async fn both_keys_empty(store: &TokenStore) -> bool {
    store.access_token().await.is_none() && store.refresh_token().await.is_none()
}

#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

pub fn native_client(base_url: &str, store: TokenStore) -> SessionClient {
    SessionClient::builder()
        .platform(Platform::Native)
        .base_url(base_url)
        .token_store(store)
        .build()
        .unwrap()
}

pub fn web_client(base_url: &str) -> SessionClient {
    SessionClient::builder()
        .platform(Platform::Web)
        .base_url(base_url)
        .build()
        .unwrap()
}

/// Native client restored into a signed-in session for `email`.
pub async fn signed_in_native(server: &MockServer, email: &str) -> (SessionClient, String) {
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    let token = access_token(email, 3600);
    let store = seeded_store(Some(&token), Some("refresh-1")).await;
    let client = native_client(&server.uri(), store);
    client.restore_session().await;
    assert_eq!(client.state().user.map(|u| u.email).as_deref(), Some(email));
    (client, token)
}

/// Number of requests the server saw for `path`.
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
