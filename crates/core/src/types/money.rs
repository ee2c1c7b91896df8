//! Monetary amounts using decimal arithmetic.
//!
//! ERP connectors report prices as decimal strings (occasionally as JSON
//! numbers); both deserialize into [`Money`]. Amounts are in the currency's
//! standard unit (dollars, not cents).

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Multiply by a quantity (unit price to line total).
    ///
    /// Saturates at the largest representable amount instead of overflowing.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .unwrap_or(if self.amount.is_sign_negative() {
                Decimal::MIN
            } else {
                Decimal::MAX
            });
        Self::new(amount, self.currency)
    }

    /// Add two amounts of the same currency.
    ///
    /// Returns `None` when the currencies differ or the sum overflows.
    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        if self.currency != other.currency {
            return None;
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency))
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = self.currency.symbol();
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            write!(f, "-{symbol}{:.2}", self.amount.abs())
        } else {
            write!(f, "{symbol}{:.2}", self.amount)
        }
    }
}

/// ISO 4217 currency codes used by the ERP price lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    MXN,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD | Self::MXN => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// The ISO code as a string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
            Self::MXN => "MXN",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn usd(s: &str) -> Money {
        Money::new(s.parse().unwrap(), CurrencyCode::USD)
    }

    #[test]
    fn test_display_rounds_to_cents() {
        assert_eq!(usd("12.5").to_string(), "$12.50");
        assert_eq!(usd("0").to_string(), "$0.00");
        assert_eq!(
            Money::new("9.99".parse().unwrap(), CurrencyCode::EUR).to_string(),
            "€9.99"
        );
    }

    #[test]
    fn test_display_negative_ledger_amount() {
        assert_eq!(usd("-5").to_string(), "-$5.00");
    }

    #[test]
    fn test_times_quantity() {
        assert_eq!(usd("2.25").times(4), usd("9.00"));
        assert!(usd("2.25").times(0).is_zero());
    }

    #[test]
    fn test_times_saturates_on_overflow() {
        let huge = Money::new(Decimal::MAX, CurrencyCode::USD);
        assert_eq!(huge.times(3).amount, Decimal::MAX);
        let owed = Money::new(Decimal::MIN, CurrencyCode::USD);
        assert_eq!(owed.times(2).amount, Decimal::MIN);
    }

    #[test]
    fn test_checked_add_rejects_mixed_currency() {
        let eur = Money::new(Decimal::ONE, CurrencyCode::EUR);
        assert!(usd("1").checked_add(&eur).is_none());
        assert_eq!(usd("1").checked_add(&usd("2.5")), Some(usd("3.5")));
    }

    #[test]
    fn test_deserializes_string_and_number_amounts() {
        let from_str: Money = serde_json::from_str(r#"{"amount":"4.00","currency":"USD"}"#).unwrap();
        let from_num: Money = serde_json::from_str(r#"{"amount":4}"#).unwrap();
        assert_eq!(from_str, from_num);
    }
}
