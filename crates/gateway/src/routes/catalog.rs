//! Catalog route handlers: products, filters, suggestions and locations.
//!
//! Open to guests. Signed-in customers are served with their own token so
//! customer-specific prices apply.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use depot_core::{
    FilterGroup, Location, Page, Product, ProductId, ProductQuery, ProductSummary, Suggestion,
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::{OptionalCustomer, SelectedLocation};
use crate::state::AppState;

/// Query keys forwarded to the ERP product listing.
const LISTING_KEYS: &[&str] = &["search", "category", "sort", "page", "per_page"];

/// Minimum query length for suggestions.
const MIN_SUGGEST_LEN: usize = 2;

/// Search suggestion query.
#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    pub q: String,
}

/// Keep known listing keys and `filter.*` facets, clamping pagination.
fn listing_query(raw: Vec<(String, String)>) -> Vec<(String, String)> {
    raw.into_iter()
        .filter(|(key, _)| LISTING_KEYS.contains(&key.as_str()) || key.starts_with("filter."))
        .map(|(key, value)| match key.as_str() {
            "page" => {
                let page = value.parse::<u32>().unwrap_or(1).max(1);
                (key, page.to_string())
            }
            "per_page" => {
                let per_page = value
                    .parse::<u32>()
                    .unwrap_or(ProductQuery::DEFAULT_PER_PAGE)
                    .clamp(1, ProductQuery::MAX_PER_PAGE);
                (key, per_page.to_string())
            }
            _ => (key, value),
        })
        .collect()
}

/// List products.
#[instrument(skip(state, auth, raw))]
pub async fn products(
    State(state): State<AppState>,
    mut auth: OptionalCustomer,
    location: SelectedLocation,
    Query(raw): Query<Vec<(String, String)>>,
) -> Result<Json<Page<ProductSummary>>> {
    let result = state
        .erp()
        .products(auth.credential(), location.as_ref(), listing_query(raw))
        .await;
    Ok(Json(auth.settle(result).await?))
}

/// Product detail.
#[instrument(skip(state, auth))]
pub async fn product(
    State(state): State<AppState>,
    mut auth: OptionalCustomer,
    location: SelectedLocation,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let result = state
        .erp()
        .product(auth.credential(), location.as_ref(), &id)
        .await;
    Ok(Json(auth.settle(result).await?))
}

/// Filter groups for the selected location.
#[instrument(skip(state))]
pub async fn filters(
    State(state): State<AppState>,
    location: SelectedLocation,
) -> Result<Json<Vec<FilterGroup>>> {
    Ok(Json(state.erp().filters(location.as_ref()).await?))
}

/// Search-as-you-type suggestions.
#[instrument(skip(state, auth))]
pub async fn suggest(
    State(state): State<AppState>,
    mut auth: OptionalCustomer,
    location: SelectedLocation,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<Vec<Suggestion>>> {
    let q = query.q.trim();
    if q.chars().count() < MIN_SUGGEST_LEN {
        return Ok(Json(Vec::new()));
    }

    let result = state
        .erp()
        .suggestions(auth.credential(), location.as_ref(), q)
        .await;
    Ok(Json(auth.settle(result).await?))
}

/// All stock locations.
#[instrument(skip(state))]
pub async fn locations(State(state): State<AppState>) -> Result<Json<Vec<Location>>> {
    Ok(Json(state.erp().locations().await?))
}
