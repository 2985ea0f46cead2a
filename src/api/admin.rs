//! User and deal administration.

use std::sync::Arc;

use super::models::{AdminDeal, AdminUser, NewUser, UserUpdate};
use super::{send_empty, send_json};
use crate::auth::fetch::FetchOptions;
use crate::auth::transport::SessionTransport;
use crate::error::{AuthError, Result};

const USERS_PATH: &str = "/api/admin/users";
const DEALS_PATH: &str = "/api/admin/deals";

/// Administrator endpoints. The backend rejects non-admin callers.
#[derive(Clone)]
pub struct AdminApi {
    transport: Arc<dyn SessionTransport>,
}

impl AdminApi {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self { transport }
    }

    // ---------------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------------

    pub async fn users(&self) -> Result<Vec<AdminUser>> {
        send_json(self.transport.as_ref(), USERS_PATH, FetchOptions::get()).await
    }

    pub async fn user(&self, id: i64) -> Result<AdminUser> {
        send_json(self.transport.as_ref(), &format!("{USERS_PATH}/{id}"), FetchOptions::get()).await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<AdminUser> {
        let options = FetchOptions::post().json(serde_json::to_value(user)?);
        send_json(self.transport.as_ref(), USERS_PATH, options).await
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<AdminUser> {
        let options = FetchOptions::put().json(serde_json::to_value(update)?);
        send_json(self.transport.as_ref(), &format!("{USERS_PATH}/{id}"), options).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        send_empty(self.transport.as_ref(), &format!("{USERS_PATH}/{id}"), FetchOptions::delete()).await
    }

    // ---------------------------------------------------------------------------
    // Deals
    // ---------------------------------------------------------------------------

    pub async fn deals(&self) -> Result<Vec<AdminDeal>> {
        send_json(self.transport.as_ref(), DEALS_PATH, FetchOptions::get()).await
    }

    pub async fn deal(&self, id: i64) -> Result<AdminDeal> {
        send_json(self.transport.as_ref(), &format!("{DEALS_PATH}/{id}"), FetchOptions::get()).await
    }

    /// Create a deal. Any `id` on `deal` is ignored.
    pub async fn create_deal(&self, deal: &AdminDeal) -> Result<AdminDeal> {
        let mut body = serde_json::to_value(deal)?;
        if let Some(fields) = body.as_object_mut() {
            fields.remove("id");
        }
        send_json(self.transport.as_ref(), DEALS_PATH, FetchOptions::post().json(body)).await
    }

    pub async fn update_deal(&self, deal: &AdminDeal) -> Result<AdminDeal> {
        let id = deal.id.ok_or(AuthError::MissingField("id"))?;
        let options = FetchOptions::put().json(serde_json::to_value(deal)?);
        send_json(self.transport.as_ref(), &format!("{DEALS_PATH}/{id}"), options).await
    }

    pub async fn delete_deal(&self, id: i64) -> Result<()> {
        send_empty(self.transport.as_ref(), &format!("{DEALS_PATH}/{id}"), FetchOptions::delete()).await
    }
}
