//! Session client: one place that wires transport, storage, session state,
//! OAuth, push registration, and the typed API wrappers.

mod actions;

pub use actions::{
    AUTHENTICATE_PATH, CHANGE_NAME_PATH, CHANGE_PASSWORD_PATH, COMPLETE_ONBOARDING_PATH,
    REGISTER_PATH,
};

use std::sync::Arc;

use reqwest::Response;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{AdminApi, DealsApi, PreferencesApi};
use crate::auth::fetch::FetchOptions;
use crate::auth::oauth::{
    AuthorizationRequest, AuthorizationResponse, ExchangeOutcome, OAuthFlow, OAuthSettings,
};
use crate::auth::restore::SessionRestorer;
use crate::auth::store::TokenStore;
use crate::auth::transport::{
    BearerTokenTransport, CookieTransport, RestoreOutcome, SessionTransport,
};
use crate::config::{Config, Platform};
use crate::error::{AuthError, Result};
use crate::net::{ApiClient, HttpClient};
use crate::push::{PushMetricsSnapshot, PushRegistrar, PushTokenSource, RetryPolicy};
use crate::session::{
    Navigator, NoopNavigator, Route, SessionEvent, SessionState, SessionStore,
};

struct ClientInner {
    transport: Arc<dyn SessionTransport>,
    session: SessionStore,
    store: TokenStore,
    restorer: SessionRestorer,
    oauth: OAuthFlow,
    navigator: Arc<dyn Navigator>,
    push: Option<Arc<PushRegistrar>>,
    push_task: Option<JoinHandle<()>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = self.push_task.take() {
            task.abort();
        }
    }
}

/// Entry point for the session lifecycle. Cheap to clone; clones share
/// one session.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl SessionClient {
    pub fn builder() -> SessionClientBuilder {
        SessionClientBuilder::default()
    }

    /// Build a client from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::builder().config(config)?.build()
    }

    // MARK: - State

    pub fn platform(&self) -> Platform {
        self.inner.transport.platform()
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.session.events()
    }

    pub fn route(&self) -> Route {
        self.inner.session.route()
    }

    /// Local credential storage. Unused by the web transport.
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn transport(&self) -> &Arc<dyn SessionTransport> {
        &self.inner.transport
    }

    /// Push registration counters, when a registrar is running.
    pub fn push_metrics(&self) -> Option<PushMetricsSnapshot> {
        self.inner.push.as_ref().map(|p| p.metrics().snapshot())
    }

    // MARK: - Lifecycle

    /// Reconstruct the session. Runs once; later calls return the first
    /// outcome.
    pub async fn restore_session(&self) -> RestoreOutcome {
        self.inner.restorer.restore().await
    }

    /// Start an OAuth authorization.
    pub fn begin_oauth(&self) -> Result<AuthorizationRequest> {
        self.inner.oauth.begin()
    }

    /// Handle a response delivered to the redirect URI.
    pub async fn handle_authorization_response(
        &self,
        response: &AuthorizationResponse,
    ) -> ExchangeOutcome {
        self.inner.oauth.handle_response(response).await
    }

    pub fn oauth(&self) -> &OAuthFlow {
        &self.inner.oauth
    }

    /// Send an authenticated request to `url`.
    ///
    /// On native this is authFetch; on web the session cookie rides along.
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<Response> {
        self.inner.transport.send(url, options).await
    }

    pub fn deals(&self) -> DealsApi {
        DealsApi::new(self.inner.transport.clone())
    }

    pub fn preferences(&self) -> PreferencesApi {
        PreferencesApi::new(self.inner.transport.clone())
    }

    pub fn admin(&self) -> AdminApi {
        AdminApi::new(self.inner.transport.clone())
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("platform", &self.platform())
            .field("base_url", &self.inner.transport.api().base_url().as_str())
            .field("store", &self.inner.store)
            .field("session", &self.inner.session)
            .finish()
    }
}

/// Builder for [`SessionClient`].
pub struct SessionClientBuilder {
    platform: Platform,
    base_url: Option<String>,
    http: Option<reqwest::Client>,
    store: Option<TokenStore>,
    navigator: Option<Arc<dyn Navigator>>,
    push_source: Option<Arc<dyn PushTokenSource>>,
    push_enabled: bool,
    push_policy: RetryPolicy,
    oauth: OAuthSettings,
}

impl Default for SessionClientBuilder {
    fn default() -> Self {
        Self {
            platform: Platform::Native,
            base_url: None,
            http: None,
            store: None,
            navigator: None,
            push_source: None,
            push_enabled: true,
            push_policy: RetryPolicy::default(),
            oauth: OAuthSettings::default(),
        }
    }
}

impl SessionClientBuilder {
    /// Take platform, origin, HTTP settings, storage, OAuth and push
    /// settings from `config`.
    pub fn config(mut self, config: &Config) -> Result<Self> {
        self.platform = config.api.platform;
        self.base_url = Some(config.base_url().to_string());
        self.http = Some(HttpClient::from_config(config).into_inner());
        self.store = Some(TokenStore::from_config(&config.storage)?);
        self.oauth = OAuthSettings::from(&config.oauth);
        self.push_enabled = config.push.enabled;
        self.push_policy = RetryPolicy::from(&config.push);
        Ok(self)
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Backend origin. Required.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// HTTP client to use. On web it must keep a cookie store.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Credential storage. Defaults to in-memory.
    pub fn token_store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Device push token source. Registration runs only on native, and only
    /// when a source is set.
    pub fn push_source(mut self, source: Arc<dyn PushTokenSource>) -> Self {
        self.push_source = Some(source);
        self
    }

    pub fn push_enabled(mut self, enabled: bool) -> Self {
        self.push_enabled = enabled;
        self
    }

    pub fn push_policy(mut self, policy: RetryPolicy) -> Self {
        self.push_policy = policy;
        self
    }

    pub fn oauth(mut self, settings: OAuthSettings) -> Self {
        self.oauth = settings;
        self
    }

    pub fn build(self) -> Result<SessionClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| AuthError::Config("base URL is required".to_string()))?;
        let http = match self.http {
            Some(http) => http,
            None => HttpClient::builder()
                .cookie_store(self.platform == Platform::Web)
                .build()
                .into_inner(),
        };
        let api = ApiClient::new(http, &base_url)?;
        let store = self.store.unwrap_or_else(TokenStore::in_memory);
        let session = SessionStore::new();

        let transport: Arc<dyn SessionTransport> = match self.platform {
            Platform::Web => Arc::new(CookieTransport::new(api)),
            Platform::Native => Arc::new(BearerTokenTransport::new(
                api,
                store.clone(),
                session.clone(),
            )),
        };

        let restorer = SessionRestorer::new(transport.clone(), session.clone());
        let oauth = OAuthFlow::new(self.oauth, transport.clone(), session.clone());

        let push = match (self.platform, self.push_enabled, self.push_source) {
            (Platform::Native, true, Some(source)) => Some(Arc::new(PushRegistrar::new(
                transport.clone(),
                source,
                self.push_policy,
            ))),
            _ => None,
        };
        let push_task = match &push {
            Some(registrar) => match tokio::runtime::Handle::try_current() {
                Ok(_) => Some(registrar.clone().spawn(session.events())),
                Err(_) => {
                    warn!("No async runtime; push registration disabled");
                    None
                }
            },
            None => None,
        };

        debug!(
            platform = %self.platform,
            base_url = %base_url,
            store = store.backend_name(),
            push = push_task.is_some(),
            "Session client ready"
        );

        Ok(SessionClient {
            inner: Arc::new(ClientInner {
                transport,
                session,
                store,
                restorer,
                oauth,
                navigator: self.navigator.unwrap_or_else(|| Arc::new(NoopNavigator)),
                push,
                push_task,
            }),
        })
    }
}
