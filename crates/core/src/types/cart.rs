//! Cart records.

use serde::{Deserialize, Serialize};

use super::id::{LineId, ProductId, VariationId};
use super::money::{CurrencyCode, Money};

/// One cart entry: a product, an optional variation, a quantity and prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineId,
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<VariationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartLine {
    /// Copy of this line at a different quantity, with the total recomputed.
    #[must_use]
    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self {
            quantity,
            line_total: self.unit_price.times(quantity),
            ..self.clone()
        }
    }
}

/// Input for adding a line to a cart.
///
/// The display fields are only needed for guest carts, which have no server
/// to price the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCartLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<VariationId>,
    pub quantity: u32,
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default, skip_serializing)]
    pub sku: Option<String>,
    #[serde(default, skip_serializing)]
    pub unit_price: Option<Money>,
    #[serde(default, skip_serializing)]
    pub image: Option<String>,
}

/// Input for changing the quantity of an existing line (`0` removes it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineUpdate {
    pub line_id: LineId,
    pub quantity: u32,
}

/// A cart: the authoritative line set plus derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
    pub item_count: u32,
}

impl Cart {
    /// Build a cart from lines, recomputing subtotal and item count.
    ///
    /// Lines in a currency other than `currency` are skipped in the subtotal.
    #[must_use]
    pub fn from_lines(lines: Vec<CartLine>, currency: CurrencyCode) -> Self {
        let subtotal = lines
            .iter()
            .fold(Money::zero(currency), |acc, line| {
                acc.checked_add(&line.line_total).unwrap_or(acc)
            });
        let item_count = lines
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity));

        Self {
            lines,
            subtotal,
            item_count,
        }
    }

    /// An empty cart.
    #[must_use]
    pub fn empty(currency: CurrencyCode) -> Self {
        Self::from_lines(Vec::new(), currency)
    }

    /// Find a line by id.
    #[must_use]
    pub fn line(&self, id: &LineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.id == id)
    }

    /// Currency of the cart, taken from the subtotal.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.subtotal.currency
    }
}

/// Structured payload of a stock conflict.
///
/// Returned with HTTP 409 when a requested quantity exceeds what the
/// selected location can supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockConflict {
    #[serde(default)]
    pub message: String,
    pub available: u32,
}

impl StockConflict {
    /// Machine-readable error code sent alongside the payload.
    pub const CODE: &'static str = "insufficient_stock";

    /// Build a conflict with the standard user-facing message.
    #[must_use]
    pub fn new(available: u32) -> Self {
        let message = if available == 0 {
            "Out of stock".to_string()
        } else {
            format!("Only {available} available")
        };
        Self { message, available }
    }
}
