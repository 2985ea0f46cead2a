use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "api.platform") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Deployment target. Selects the session transport once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Browser build: HTTP-only cookie session held by the backend.
    Web,
    /// Mobile build: access/refresh token pair in secure storage.
    Native,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Web => write!(f, "web"),
            Platform::Native => write!(f, "native"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(Platform::Web),
            "native" | "android" | "ios" => Ok(Platform::Native),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

/// Token storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Keyring,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::File => write!(f, "file"),
            StorageBackend::Keyring => write!(f, "keyring"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            other => Err(format!("Unknown storage backend: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_platform")]
    pub platform: Platform,
    /// Backend origin used by the web build.
    #[serde(default = "default_origin")]
    pub web_origin: String,
    /// Tunnel origin used by the native build.
    #[serde(default = "default_origin")]
    pub tunnel_origin: String,
    /// Header sent with every request to get past the tunnel's interstitial.
    /// Empty or absent disables it.
    #[serde(default = "default_gateway_header")]
    pub gateway_bypass_header: Option<String>,
    #[serde(default = "default_gateway_value")]
    pub gateway_bypass_value: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            web_origin: default_origin(),
            tunnel_origin: default_origin(),
            gateway_bypass_header: default_gateway_header(),
            gateway_bypass_value: default_gateway_value(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Directory for the file backend.
    #[serde(default = "default_token_storage_dir")]
    pub dir: PathBuf,
    /// Service name for the keyring backend.
    #[serde(default = "default_keyring_service")]
    pub service: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            dir: default_token_storage_dir(),
            service: default_keyring_service(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Authorization endpoint path on the platform origin.
    #[serde(default = "default_authorize_path")]
    pub authorize_path: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            scopes: default_scopes(),
            redirect_uri: default_redirect_uri(),
            authorize_path: default_authorize_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_push_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_push_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_push_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_push_max_retries(),
            initial_backoff_ms: default_push_initial_backoff_ms(),
            max_backoff_ms: default_push_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_platform() -> Platform {
    Platform::Native
}
fn default_origin() -> String {
    "http://localhost:8080".to_string()
}
fn default_gateway_header() -> Option<String> {
    Some("ngrok-skip-browser-warning".to_string())
}
fn default_gateway_value() -> String {
    "true".to_string()
}
const fn default_connect_timeout_secs() -> u64 {
    10
}
const fn default_request_timeout_secs() -> u64 {
    30
}
const fn default_storage_backend() -> StorageBackend {
    StorageBackend::File
}
fn default_token_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dealboard")
        .join("tokens")
}
fn default_keyring_service() -> String {
    "dealboard".to_string()
}
fn default_client_id() -> String {
    "google".to_string()
}
fn default_scopes() -> Vec<String> {
    vec!["openid".into(), "profile".into(), "email".into()]
}
fn default_redirect_uri() -> String {
    "dealboard://redirect".to_string()
}
fn default_authorize_path() -> String {
    "/api/auth/authorize".to_string()
}
const fn default_true() -> bool {
    true
}
const fn default_push_max_retries() -> u32 {
    3
}
const fn default_push_initial_backoff_ms() -> u64 {
    500
}
const fn default_push_max_backoff_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `DEALBOARD_` takes precedence over
    /// the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Origin requests are sent to for the configured platform.
    pub fn base_url(&self) -> &str {
        match self.api.platform {
            Platform::Web => &self.api.web_origin,
            Platform::Native => &self.api.tunnel_origin,
        }
    }

    /// Gateway-bypass header as a name/value pair, if enabled.
    pub fn gateway_header(&self) -> Option<(&str, &str)> {
        self.api
            .gateway_bypass_header
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| (name, self.api.gateway_bypass_value.as_str()))
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    } else {
                        tracing::warn!(env = $env, value = %val, "Ignoring unparseable override");
                    }
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- API --
        env_parse!("api.platform", "DEALBOARD_PLATFORM", self.api.platform);
        env_str!("api.web_origin", "DEALBOARD_WEB_ORIGIN", self.api.web_origin);
        env_str!(
            "api.tunnel_origin",
            "DEALBOARD_TUNNEL_ORIGIN",
            self.api.tunnel_origin
        );
        env_opt_str!(
            "api.gateway_bypass_header",
            "DEALBOARD_GATEWAY_HEADER",
            self.api.gateway_bypass_header
        );
        env_parse!(
            "api.connect_timeout_secs",
            "DEALBOARD_CONNECT_TIMEOUT_SECS",
            self.api.connect_timeout_secs
        );
        env_parse!(
            "api.request_timeout_secs",
            "DEALBOARD_REQUEST_TIMEOUT_SECS",
            self.api.request_timeout_secs
        );

        // -- Storage --
        env_parse!(
            "storage.backend",
            "DEALBOARD_STORAGE_BACKEND",
            self.storage.backend
        );
        if let Ok(val) = std::env::var("DEALBOARD_STORAGE_DIR") {
            self.storage.dir = PathBuf::from(val);
            ov.record("storage.dir", "DEALBOARD_STORAGE_DIR");
        }
        env_str!(
            "storage.service",
            "DEALBOARD_KEYRING_SERVICE",
            self.storage.service
        );

        // -- OAuth --
        env_str!(
            "oauth.client_id",
            "DEALBOARD_OAUTH_CLIENT_ID",
            self.oauth.client_id
        );
        env_str!(
            "oauth.redirect_uri",
            "DEALBOARD_OAUTH_REDIRECT_URI",
            self.oauth.redirect_uri
        );
        if let Ok(val) = std::env::var("DEALBOARD_OAUTH_SCOPES") {
            self.oauth.scopes = val
                .split([',', ' '])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            ov.record("oauth.scopes", "DEALBOARD_OAUTH_SCOPES");
        }

        // -- Push --
        env_bool!("push.enabled", "DEALBOARD_PUSH_ENABLED", self.push.enabled);
        env_parse!(
            "push.max_retries",
            "DEALBOARD_PUSH_MAX_RETRIES",
            self.push.max_retries
        );

        // -- Logging --
        env_str!("logging.level", "DEALBOARD_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "DEALBOARD_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// Helper for default token storage directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
