//! Typed wrappers over authenticated requests for the screens' endpoints.
//!
//! Every call goes through the session transport, so native requests get
//! the authFetch pre-flight refresh and web requests carry the cookie.

pub mod admin;
pub mod deals;
pub mod models;
pub mod preferences;

pub use admin::AdminApi;
pub use deals::DealsApi;
pub use preferences::{PreferencesApi, resolve_store_names};
pub use models::{
    AdminDeal, AdminUser, Deal, DealQuery, GroupedDeal, NewUser, NotificationToggle, Page,
    RecommendedStore, SortDirection, SortField, StoreSummary, UserUpdate,
};

use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::auth::fetch::FetchOptions;
use crate::auth::transport::SessionTransport;
use crate::error::Result;
use crate::net::api_error;

async fn send(
    transport: &dyn SessionTransport,
    path: &str,
    options: FetchOptions,
) -> Result<Response> {
    let response = transport.send(path, options).await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response)
}

/// Send and decode a JSON body.
async fn send_json<T: DeserializeOwned>(
    transport: &dyn SessionTransport,
    path: &str,
    options: FetchOptions,
) -> Result<T> {
    let response = send(transport, path, options).await?;
    Ok(response.json().await?)
}

/// Send and discard the body.
async fn send_empty(
    transport: &dyn SessionTransport,
    path: &str,
    options: FetchOptions,
) -> Result<()> {
    send(transport, path, options).await.map(|_| ())
}
