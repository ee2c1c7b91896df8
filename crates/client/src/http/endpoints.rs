//! Typed gateway endpoints.

use depot_core::{
    Address, Cart, CartLineUpdate, CheckoutBootstrap, CreateOrder, Customer, Document, Email,
    FilterGroup, Invoice, LedgerEntry, LineId, Location, NewCartLine, OrderConfirmation,
    OrderSummary, Page, Payment, Product, ProductId, ProductQuery, ProductSummary, Profile,
    ProfileUpdate, Suggestion,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{ApiClient, RequestOptions, segment};
use crate::error::ClientError;
use crate::session::{LogoutReason, SessionEvent};

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

impl ApiClient {
    // =========================================================================
    // Session
    // =========================================================================

    /// The signed-in customer.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<Customer, ClientError> {
        self.get("/account/me").fetch().await
    }

    /// Sign in and broadcast [`SessionEvent::LoggedIn`].
    ///
    /// A 401 here means bad credentials and does not broadcast a logout.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for rejected credentials.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Customer, ClientError> {
        let customer: Customer = self
            .post("/auth/login")
            .options(RequestOptions {
                quiet_unauthorized: true,
                ..RequestOptions::default()
            })
            .json(&LoginBody {
                email: email.as_str(),
                password: password.expose_secret(),
            })?
            .fetch()
            .await?;

        self.broadcast(SessionEvent::LoggedIn(customer.clone()));
        Ok(customer)
    }

    /// Sign out and broadcast [`SessionEvent::LoggedOut`].
    ///
    /// An already-expired session counts as signed out.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway could not be reached.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ClientError> {
        match self.post("/auth/logout").execute().await {
            Ok(()) | Err(ClientError::Unauthorized) => {
                self.broadcast(SessionEvent::LoggedOut(LogoutReason::UserRequested));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Product listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, query))]
    pub async fn products(&self, query: &ProductQuery) -> Result<Page<ProductSummary>, ClientError> {
        self.get("/products").query_pairs(query.to_pairs()).fetch().await
    }

    /// Product detail.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown products.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Product, ClientError> {
        self.get(format!("/products/{}", segment(id.as_str())))
            .fetch()
            .await
    }

    /// Filter facets for the listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn filters(&self) -> Result<Vec<FilterGroup>, ClientError> {
        self.get("/filters").fetch().await
    }

    /// Locations the customer can select.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn locations(&self) -> Result<Vec<Location>, ClientError> {
        self.get("/locations").fetch().await
    }

    /// Search-as-you-type suggestions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn suggest(&self, q: &str) -> Result<Vec<Suggestion>, ClientError> {
        self.get("/search/suggest").query("q", q).fetch().await
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// The server cart of the signed-in customer.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    #[instrument(skip(self))]
    pub async fn cart(&self) -> Result<Cart, ClientError> {
        self.get("/cart").fetch().await
    }

    /// Add a line, returning the updated cart.
    ///
    /// # Errors
    ///
    /// Returns `StockConflict` when the quantity exceeds stock.
    #[instrument(skip(self, line), fields(product_id = %line.product_id, quantity = line.quantity))]
    pub async fn add_to_cart(&self, line: &NewCartLine) -> Result<Cart, ClientError> {
        self.post("/cart/add").json(line)?.fetch().await
    }

    /// Set a line's quantity (`0` removes), returning the updated cart.
    ///
    /// # Errors
    ///
    /// Returns `StockConflict` when the quantity exceeds stock.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_cart_line(&self, line_id: &LineId, quantity: u32) -> Result<Cart, ClientError> {
        self.post("/cart/update")
            .json(&CartLineUpdate {
                line_id: line_id.clone(),
                quantity,
            })?
            .fetch()
            .await
    }

    /// Remove a line, returning the updated cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_cart_line(&self, line_id: &LineId) -> Result<Cart, ClientError> {
        self.delete(format!("/cart/remove/{}", segment(line_id.as_str())))
            .fetch()
            .await
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Cart, addresses, shipping methods and terms for checkout.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    #[instrument(skip(self))]
    pub async fn checkout_bootstrap(&self) -> Result<CheckoutBootstrap, ClientError> {
        self.get("/checkout/bootstrap").fetch().await
    }

    /// Place an order from the current cart.
    ///
    /// # Errors
    ///
    /// Returns `StockConflict` when stock ran out since the cart was built.
    #[instrument(skip(self, order))]
    pub async fn create_order(&self, order: &CreateOrder) -> Result<OrderConfirmation, ClientError> {
        self.post("/checkout/create").json(order)?.fetch().await
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// Order history.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    pub async fn orders(&self, page: u32) -> Result<Page<OrderSummary>, ClientError> {
        self.account_page("orders", page).await
    }

    /// Invoices.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    pub async fn invoices(&self, page: u32) -> Result<Page<Invoice>, ClientError> {
        self.account_page("invoices", page).await
    }

    /// Payments received.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    pub async fn payments(&self, page: u32) -> Result<Page<Payment>, ClientError> {
        self.account_page("payments", page).await
    }

    /// Account ledger.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    pub async fn ledger(&self, page: u32) -> Result<Page<LedgerEntry>, ClientError> {
        self.account_page("ledger", page).await
    }

    /// Addresses on file.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    pub async fn addresses(&self, page: u32) -> Result<Page<Address>, ClientError> {
        self.account_page("addresses", page).await
    }

    /// Account documents.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    pub async fn documents(&self, page: u32) -> Result<Page<Document>, ClientError> {
        self.account_page("documents", page).await
    }

    /// The customer profile.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<Profile, ClientError> {
        self.get("/account/profile").fetch().await
    }

    /// Update the customer profile.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ClientError> {
        self.put("/account/profile").json(update)?.fetch().await
    }

    #[instrument(skip(self))]
    async fn account_page<T: DeserializeOwned>(
        &self,
        kind: &str,
        page: u32,
    ) -> Result<Page<T>, ClientError> {
        self.get(format!("/account/{kind}"))
            .query("page", page.max(1))
            .fetch()
            .await
    }
}
