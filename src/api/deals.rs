//! Deal listings.

use std::sync::Arc;

use super::models::{Deal, DealQuery, GroupedDeal, Page, RecommendedStore};
use super::send_json;
use crate::auth::fetch::FetchOptions;
use crate::auth::transport::SessionTransport;
use crate::error::Result;

const MINE_PATH: &str = "/api/deals/mine";
const ALL_PATH: &str = "/api/deals/all";
const RECOMMENDED_STORE_PATH: &str = "/api/deals/recommended-store";

/// Deals visible to the signed-in user.
#[derive(Clone)]
pub struct DealsApi {
    transport: Arc<dyn SessionTransport>,
}

impl DealsApi {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self { transport }
    }

    /// Deals matching the user's tracked keywords.
    pub async fn mine(&self, page: u32, size: u32) -> Result<Page<GroupedDeal>> {
        let options = FetchOptions::get().query("page", page).query("size", size);
        send_json(self.transport.as_ref(), MINE_PATH, options).await
    }

    /// Every deal, filtered and sorted.
    pub async fn all(&self, query: &DealQuery) -> Result<Page<Deal>> {
        let mut options = FetchOptions::get();
        options.query = query.to_pairs();
        send_json(self.transport.as_ref(), ALL_PATH, options).await
    }

    pub async fn recommended_store(&self) -> Result<RecommendedStore> {
        send_json(
            self.transport.as_ref(),
            RECOMMENDED_STORE_PATH,
            FetchOptions::get(),
        )
        .await
    }
}
