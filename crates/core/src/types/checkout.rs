//! Checkout records.

use serde::{Deserialize, Serialize};

use super::account::Address;
use super::cart::Cart;
use super::id::{AddressId, LocationId, OrderId};
use super::money::Money;

/// A shipping method offered for the current cart and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub code: String,
    pub label: String,
    pub cost: Money,
}

/// Everything the checkout view needs in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutBootstrap {
    pub cart: Cart,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
    /// Payment terms on the account (e.g. "Net 30").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
}

/// Order placement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub shipping_address_id: AddressId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address_id: Option<AddressId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Result of a successful order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub order_number: String,
}
