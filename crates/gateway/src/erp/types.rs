//! ERP connector wire types and their normalization into `depot-core` records.

use chrono::Utc;
use depot_core::{
    Address, Cart, CartLine, CurrencyCode, LineId, Money, Page, ProductId, ShippingMethod,
    VariationId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// OAuth Types
// ─────────────────────────────────────────────────────────────────────────────

/// Bearer token issued by the ERP connector.
///
/// Customer tokens are kept in the session; the service token lives in the
/// client's cache.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpToken {
    /// The access token for API requests.
    pub access_token: String,
    /// The refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds.
    pub expires_in: Option<i64>,
    /// Unix timestamp when the token was obtained.
    pub obtained_at: i64,
}

impl ErpToken {
    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_in.is_some_and(|expires_in| {
            let now = Utc::now().timestamp();
            let expires_at = self.obtained_at + expires_in;
            now >= (expires_at - 60)
        })
    }
}

impl std::fmt::Debug for ErpToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErpToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Raw token response from the ERP OAuth endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl From<TokenResponse> for ErpToken {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            obtained_at: Utc::now().timestamp(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cart Types
// ─────────────────────────────────────────────────────────────────────────────

/// Cart as the connector returns it: bare decimal prices plus one currency.
#[derive(Debug, Deserialize)]
pub(super) struct ErpCart {
    #[serde(default)]
    pub lines: Vec<ErpCartLine>,
    #[serde(default)]
    pub currency: CurrencyCode,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErpCartLine {
    pub id: LineId,
    pub product_id: ProductId,
    #[serde(default)]
    pub variation_id: Option<VariationId>,
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
}

impl From<ErpCart> for Cart {
    fn from(cart: ErpCart) -> Self {
        let currency = cart.currency;
        let lines = cart
            .lines
            .into_iter()
            .filter(|line| line.quantity > 0)
            .map(|line| {
                let unit_price = Money::new(line.unit_price, currency);
                CartLine {
                    id: line.id,
                    product_id: line.product_id,
                    variation_id: line.variation_id,
                    sku: line.sku,
                    name: line.name,
                    quantity: line.quantity,
                    unit_price,
                    line_total: unit_price.times(line.quantity),
                    image: line.image,
                }
            })
            .collect();

        Self::from_lines(lines, currency)
    }
}

/// Body of `POST /carts/current/lines`.
#[derive(Debug, Serialize)]
pub(super) struct AddLineBody<'a> {
    pub product_id: &'a ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<&'a VariationId>,
    pub quantity: u32,
}

/// Body of `PATCH /carts/current/lines/{id}`.
#[derive(Debug, Serialize)]
pub(super) struct QuantityBody {
    pub quantity: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing Types
// ─────────────────────────────────────────────────────────────────────────────

/// Paginated list envelope.
#[derive(Debug, Deserialize)]
pub(super) struct ErpPage<T> {
    pub data: Vec<T>,
    pub meta: ErpPageMeta,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErpPageMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> From<ErpPage<T>> for Page<T> {
    fn from(page: ErpPage<T>) -> Self {
        Self {
            items: page.data,
            page: page.meta.current_page,
            per_page: page.meta.per_page,
            total: page.meta.total,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Checkout Types
// ─────────────────────────────────────────────────────────────────────────────

/// Checkout options for the current customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutOptions {
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
    #[serde(default)]
    pub payment_terms: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Error body returned by the connector.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErpErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Present on stock conflicts.
    #[serde(default)]
    pub available: Option<u32>,
}

impl ErpErrorBody {
    pub fn text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .filter(|m| !m.is_empty())
    }
}
