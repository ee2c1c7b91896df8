//! HTTP route handlers for the gateway.
//!
//! # Route Structure
//!
//! All API routes are nested under `/api`; health checks live at the root.
//!
//! ```text
//! GET    /health                       - Liveness
//! GET    /health/ready                 - Readiness (database ping)
//!
//! # Auth
//! POST   /api/auth/login               - Sign in (rate limited)
//! POST   /api/auth/logout              - Sign out
//!
//! # Catalog (guests allowed, location scoped)
//! GET    /api/products                 - Product listing
//! GET    /api/products/{id}            - Product detail
//! GET    /api/filters                  - Filter groups
//! GET    /api/search/suggest?q=        - Search suggestions
//! GET    /api/locations                - Stock locations
//!
//! # Cart (requires auth, location scoped)
//! GET    /api/cart                     - Current cart
//! POST   /api/cart/add                 - Add a line
//! POST   /api/cart/update              - Set a quantity (0 removes)
//! DELETE /api/cart/remove/{id}         - Remove a line
//!
//! # Checkout (requires auth, location scoped)
//! GET    /api/checkout/bootstrap       - Checkout options plus cart
//! POST   /api/checkout/create          - Place order
//!
//! # Account (requires auth)
//! GET    /api/account/me               - Current customer
//! GET    /api/account/{orders,invoices,payments,ledger,addresses,documents}
//! GET    /api/account/profile          - Profile
//! PUT    /api/account/profile          - Update profile
//! ```

pub mod account;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod health;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Path prefix of the API routes.
pub const API_PREFIX: &str = "/api";

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/auth/login",
            post(auth::login).layer(auth_rate_limiter()),
        )
        .route("/auth/logout", post(auth::logout))
}

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::products))
        .route("/products/{id}", get(catalog::product))
        .route("/filters", get(catalog::filters))
        .route("/search/suggest", get(catalog::suggest))
        .route("/locations", get(catalog::locations))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::show))
        .route("/cart/add", post(cart::add))
        .route("/cart/update", post(cart::update))
        .route("/cart/remove/{id}", delete(cart::remove))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout/bootstrap", get(checkout::bootstrap))
        .route("/checkout/create", post(checkout::create))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/account/me", get(account::me))
        .route("/account/orders", get(account::orders))
        .route("/account/invoices", get(account::invoices))
        .route("/account/payments", get(account::payments))
        .route("/account/ledger", get(account::ledger))
        .route("/account/addresses", get(account::addresses))
        .route("/account/documents", get(account::documents))
        .route(
            "/account/profile",
            get(account::profile).put(account::update_profile),
        )
}

/// Create all routes for the gateway.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .merge(auth_routes())
        .merge(catalog_routes())
        .merge(cart_routes())
        .merge(checkout_routes())
        .merge(account_routes());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest(API_PREFIX, api)
}
