//! Cart route handlers.
//!
//! Only signed-in customers have a server cart; guests keep theirs on the
//! client until sign-in. Every mutation answers with the full cart.

use axum::{
    Json,
    extract::{Path, State},
};
use depot_core::{Cart, CartLineUpdate, LineId, NewCartLine};
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{RequireCustomer, SelectedLocation};
use crate::state::AppState;

/// Largest quantity accepted for a single line.
const MAX_LINE_QUANTITY: u32 = 99_999;

/// Get the current cart.
#[instrument(skip(state, auth), fields(customer_id = %auth.customer.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    location: SelectedLocation,
) -> Result<Json<Cart>> {
    let result = state.erp().cart(auth.credential(), location.as_ref()).await;
    Ok(Json(auth.settle(result).await?))
}

/// Add a line to the cart.
#[instrument(
    skip(state, auth, line),
    fields(customer_id = %auth.customer.id, product_id = %line.product_id, quantity = line.quantity)
)]
pub async fn add(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    location: SelectedLocation,
    Json(line): Json<NewCartLine>,
) -> Result<Json<Cart>> {
    if line.quantity == 0 || line.quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )));
    }

    add_breadcrumb(
        "cart",
        "Added line",
        Some(&[("product_id", line.product_id.as_str())]),
    );
    let result = state
        .erp()
        .add_cart_line(auth.credential(), location.as_ref(), &line)
        .await;
    Ok(Json(auth.settle(result).await?))
}

/// Set a line's quantity; zero removes the line.
#[instrument(
    skip(state, auth, update),
    fields(customer_id = %auth.customer.id, line_id = %update.line_id, quantity = update.quantity)
)]
pub async fn update(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    location: SelectedLocation,
    Json(update): Json<CartLineUpdate>,
) -> Result<Json<Cart>> {
    if update.quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "quantity must be at most {MAX_LINE_QUANTITY}"
        )));
    }

    let erp = state.erp();
    let result = if update.quantity == 0 {
        erp.remove_cart_line(auth.credential(), location.as_ref(), &update.line_id)
            .await
    } else {
        erp.update_cart_line(
            auth.credential(),
            location.as_ref(),
            &update.line_id,
            update.quantity,
        )
        .await
    };
    Ok(Json(auth.settle(result).await?))
}

/// Remove a line.
#[instrument(skip(state, auth), fields(customer_id = %auth.customer.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    location: SelectedLocation,
    Path(line_id): Path<LineId>,
) -> Result<Json<Cart>> {
    let result = state
        .erp()
        .remove_cart_line(auth.credential(), location.as_ref(), &line_id)
        .await;
    Ok(Json(auth.settle(result).await?))
}
