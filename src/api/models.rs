//! Wire types for the deals, preferences and admin endpoints.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    /// `true` on the final page.
    #[serde(default)]
    pub last: bool,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub total_elements: Option<u64>,
}

impl<T> Page<T> {
    /// Whether another page may follow. A short page is the last one.
    pub fn has_more(&self, page_size: usize) -> bool {
        !self.last && self.content.len() >= page_size
    }
}

// ---------------------------------------------------------------------------
// Deals
// ---------------------------------------------------------------------------

/// A deal as listed to users.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Deal {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub store: String,
    pub category: String,
    #[serde(default)]
    pub promo_notes: Option<String>,
    #[serde(default)]
    pub price_value: Option<f64>,
    #[serde(default)]
    pub price_alt: Option<String>,
    #[serde(default)]
    pub discount_percent: Option<f64>,
    #[serde(default, rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub valid_until: Option<String>,
    #[serde(default, rename = "hasNotification")]
    pub has_notification: bool,
}

/// A deal matched to one of the user's tracked keywords.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedDeal {
    pub keyword: String,
    pub deal: Deal,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_cheapest: bool,
}

/// Store with the most matching deals today.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedStore {
    pub name: String,
    pub deal_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Name,
    Price,
    Discount,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Price => "priceValue",
            SortField::Discount => "discountPercentage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Filters and paging for `/api/deals/all`.
#[derive(Debug, Clone, PartialEq)]
pub struct DealQuery {
    pub page: u32,
    pub size: u32,
    pub sort: SortField,
    pub direction: SortDirection,
    pub name: Option<String>,
    pub store: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl Default for DealQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: 20,
            sort: SortField::default(),
            direction: SortDirection::default(),
            name: None,
            store: None,
            category: None,
            min_price: None,
            max_price: None,
        }
    }
}

impl DealQuery {
    /// Query-string pairs. Blank text filters are left out.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
            (
                "sort".to_string(),
                format!("{},{}", self.sort.as_str(), self.direction.as_str()),
            ),
        ];
        let text = [
            ("name", &self.name),
            ("store", &self.store),
            ("category", &self.category),
        ];
        for (key, value) in text {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
        if let Some(min) = self.min_price {
            pairs.push(("minPrice".to_string(), min.to_string()));
        }
        if let Some(max) = self.max_price {
            pairs.push(("maxPrice".to_string(), max.to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// A store known to the backend, with its current deal count.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub name: String,
    #[serde(default)]
    pub deal_count: u32,
}

/// A saved selection. The backend answers with either a bare array or an
/// object wrapping it under `stores` / `products`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Selection {
    List(Vec<String>),
    Stores { stores: Vec<String> },
    Products { products: Vec<String> },
}

impl Selection {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Selection::List(items)
            | Selection::Stores { stores: items }
            | Selection::Products { products: items } => items,
        }
    }
}

/// Body of `toggle-notification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationToggle {
    pub product_name: String,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Partial user update; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A deal as managed by administrators.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDeal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub store: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deal_query_pairs() {
        let query = DealQuery {
            page: 2,
            sort: SortField::Price,
            direction: SortDirection::Desc,
            name: Some("  milk ".into()),
            store: Some("".into()),
            max_price: Some(9.5),
            ..Default::default()
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("page".to_string(), "2".to_string()),
                ("size".to_string(), "20".to_string()),
                ("sort".to_string(), "priceValue,DESC".to_string()),
                ("name".to_string(), "milk".to_string()),
                ("maxPrice".to_string(), "9.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_deal_wire_names() {
        let deal: Deal = serde_json::from_str(
            r#"{"id":7,"name":"Milk","store":"Lidl","category":"dairy",
                "price_value":2.49,"discount_percent":30,"imageUrl":"x.png",
                "hasNotification":true}"#,
        )
        .unwrap();
        assert_eq!(deal.price_value, Some(2.49));
        assert_eq!(deal.discount_percent, Some(30.0));
        assert_eq!(deal.image_url.as_deref(), Some("x.png"));
        assert!(deal.has_notification);
    }

    #[test]
    fn test_page_has_more() {
        let page: Page<RecommendedStore> =
            serde_json::from_str(r#"{"content":[{"name":"Lidl","dealCount":3}],"last":false}"#)
                .unwrap();
        assert!(!page.has_more(20));
        assert!(page.has_more(1));
    }

    #[test]
    fn test_selection_shapes() {
        let bare: Selection = serde_json::from_str(r#"["Lidl","Aldi"]"#).unwrap();
        assert_eq!(bare.into_vec(), vec!["Lidl", "Aldi"]);

        let wrapped: Selection = serde_json::from_str(r#"{"stores":["Lidl"]}"#).unwrap();
        assert_eq!(wrapped.into_vec(), vec!["Lidl"]);

        let products: Selection = serde_json::from_str(r#"{"products":["milk"]}"#).unwrap();
        assert_eq!(products.into_vec(), vec!["milk"]);
    }

    #[test]
    fn test_user_update_skips_unset() {
        let update = UserUpdate {
            role: Some("ADMIN".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            serde_json::json!({ "role": "ADMIN" })
        );
    }
}
