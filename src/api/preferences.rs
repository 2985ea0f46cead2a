//! Store and product preferences chosen during onboarding and edited later.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use super::models::{NotificationToggle, Selection, StoreSummary};
use super::{send_empty, send_json};
use crate::auth::fetch::FetchOptions;
use crate::auth::transport::SessionTransport;
use crate::error::Result;

const STORES_PATH: &str = "/api/stores";
const SELECTED_STORES_PATH: &str = "/api/users/selected-stores";
const SELECTED_PRODUCTS_PATH: &str = "/api/users/selected-products";
const TRACKED_PRODUCTS_PATH: &str = "/api/users/tracked-products";
const TOGGLE_NOTIFICATION_PATH: &str = "/api/users/toggle-notification";
const NEARBY_STORES_PATH: &str = "/api/shops/nearby/unique";

/// The signed-in user's store and product preferences.
#[derive(Clone)]
pub struct PreferencesApi {
    transport: Arc<dyn SessionTransport>,
}

impl PreferencesApi {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self { transport }
    }

    /// Every store the backend knows about.
    pub async fn stores(&self) -> Result<Vec<StoreSummary>> {
        send_json(self.transport.as_ref(), STORES_PATH, FetchOptions::get()).await
    }

    pub async fn selected_stores(&self) -> Result<Vec<String>> {
        self.selection(SELECTED_STORES_PATH).await
    }

    /// Replace the selected stores.
    pub async fn save_selected_stores(&self, stores: &[String]) -> Result<()> {
        self.save_list(SELECTED_STORES_PATH, stores).await
    }

    pub async fn selected_products(&self) -> Result<Vec<String>> {
        self.selection(SELECTED_PRODUCTS_PATH).await
    }

    /// Replace the selected products.
    pub async fn save_selected_products(&self, products: &[String]) -> Result<()> {
        self.save_list(SELECTED_PRODUCTS_PATH, products).await
    }

    /// Initial product keywords saved at the end of onboarding.
    pub async fn save_tracked_products(&self, products: &[String]) -> Result<()> {
        self.save_list(TRACKED_PRODUCTS_PATH, products).await
    }

    /// Turn deal notifications for `product_name` on or off.
    pub async fn toggle_notification(&self, product_name: &str, active: bool) -> Result<()> {
        let body = NotificationToggle {
            product_name: product_name.to_string(),
            active,
        };
        let options = FetchOptions::post().json(serde_json::to_value(&body)?);
        send_empty(self.transport.as_ref(), TOGGLE_NOTIFICATION_PATH, options).await
    }

    /// Names of the stores within `radius_km` of a position, as the shop
    /// index spells them.
    pub async fn nearby_stores(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<String>> {
        let options = FetchOptions::get()
            .query("lat", lat)
            .query("lon", lon)
            .query("radiusKm", radius_km);
        send_json(self.transport.as_ref(), NEARBY_STORES_PATH, options).await
    }

    async fn selection(&self, path: &str) -> Result<Vec<String>> {
        let selection: Selection =
            send_json(self.transport.as_ref(), path, FetchOptions::get()).await?;
        Ok(selection.into_vec())
    }

    async fn save_list(&self, path: &str, items: &[String]) -> Result<()> {
        let options = FetchOptions::post().json(json!(items));
        send_empty(self.transport.as_ref(), path, options).await
    }
}

/// Map nearby shop names onto known store names, ignoring case.
///
/// Names with no known store are dropped; the result keeps the known
/// spelling and the order of `nearby`, without duplicates.
pub fn resolve_store_names(nearby: &[String], known: &[StoreSummary]) -> Vec<String> {
    let by_upper: HashMap<String, &str> = known
        .iter()
        .map(|s| (s.name.to_uppercase(), s.name.as_str()))
        .collect();

    let mut resolved: Vec<String> = Vec::new();
    for name in nearby {
        if let Some(spelled) = by_upper.get(&name.to_uppercase()) {
            if !resolved.iter().any(|r| r == spelled) {
                resolved.push(spelled.to_string());
            }
        }
    }
    resolved
}
