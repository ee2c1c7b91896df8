//! Checkout route handlers.

use axum::{Json, extract::State};
use depot_core::{CheckoutBootstrap, CreateOrder, OrderConfirmation};
use tracing::{info, instrument};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{RequireCustomer, SelectedLocation};
use crate::state::AppState;

/// Everything the checkout form needs: cart, addresses, shipping methods and
/// payment terms.
#[instrument(skip(state, auth), fields(customer_id = %auth.customer.id))]
pub async fn bootstrap(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    location: SelectedLocation,
) -> Result<Json<CheckoutBootstrap>> {
    let erp = state.erp();

    let result = erp.cart(auth.credential(), location.as_ref()).await;
    let cart = auth.settle(result).await?;

    let result = erp.checkout_options(auth.credential(), location.as_ref()).await;
    let options = auth.settle(result).await?;

    Ok(Json(CheckoutBootstrap {
        cart,
        addresses: options.addresses,
        shipping_methods: options.shipping_methods,
        payment_terms: options.payment_terms,
        location_id: location.0,
    }))
}

/// Place the order.
#[instrument(skip(state, auth, order), fields(customer_id = %auth.customer.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireCustomer(mut auth): RequireCustomer,
    location: SelectedLocation,
    Json(order): Json<CreateOrder>,
) -> Result<Json<OrderConfirmation>> {
    add_breadcrumb("checkout", "Placing order", None);

    let result = state
        .erp()
        .create_order(auth.credential(), location.as_ref(), &order)
        .await;
    let confirmation = auth.settle(result).await?;

    info!(order_number = %confirmation.order_number, "Order placed");
    Ok(Json(confirmation))
}
