//! Account route handlers (signed-in customers only).

use axum::{
    Json,
    extract::{Query, State},
};
use depot_core::{
    Address, Customer, Document, Invoice, LedgerEntry, OrderSummary, Page, Payment, Profile,
    ProfileUpdate,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::{CustomerSession, RequireCustomer};
use crate::state::AppState;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// Pagination query for account listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }
}

async fn listing<T: DeserializeOwned>(
    state: &AppState,
    auth: &mut CustomerSession,
    kind: &str,
    query: &PageQuery,
) -> Result<Json<Page<T>>> {
    let result = state
        .erp()
        .account_page(auth.credential(), kind, query.page(), query.per_page())
        .await;
    Ok(Json(auth.settle(result).await?))
}

/// The signed-in customer.
pub async fn me(RequireCustomer(auth): RequireCustomer) -> Json<Customer> {
    Json(auth.customer)
}

#[instrument(skip(state, auth))]
pub async fn orders(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<OrderSummary>>> {
    listing(&state, &mut auth, "orders", &query).await
}

#[instrument(skip(state, auth))]
pub async fn invoices(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Invoice>>> {
    listing(&state, &mut auth, "invoices", &query).await
}

#[instrument(skip(state, auth))]
pub async fn payments(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Payment>>> {
    listing(&state, &mut auth, "payments", &query).await
}

#[instrument(skip(state, auth))]
pub async fn ledger(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<LedgerEntry>>> {
    listing(&state, &mut auth, "ledger", &query).await
}

#[instrument(skip(state, auth))]
pub async fn addresses(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Address>>> {
    listing(&state, &mut auth, "addresses", &query).await
}

#[instrument(skip(state, auth))]
pub async fn documents(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Document>>> {
    listing(&state, &mut auth, "documents", &query).await
}

/// The customer's profile.
#[instrument(skip(state, auth))]
pub async fn profile(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
) -> Result<Json<Profile>> {
    let result = state.erp().profile(auth.credential()).await;
    Ok(Json(auth.settle(result).await?))
}

/// Update name or phone.
#[instrument(skip(state, auth, update))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    let result = state.erp().update_profile(auth.credential(), &update).await;
    Ok(Json(auth.settle(result).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_clamps() {
        let query = PageQuery {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), MAX_PER_PAGE);

        let defaults = PageQuery::default();
        assert_eq!(defaults.page(), 1);
        assert_eq!(defaults.per_page(), DEFAULT_PER_PAGE);
    }
}
