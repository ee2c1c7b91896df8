//! Local cart for signed-out shoppers.
//!
//! Guests have no server cart. Lines live in a [`LocalStore`] under
//! `guest_cart` and are merged into the server cart at sign-in.

use depot_core::{CartLine, CurrencyCode, LineId, NewCartLine, ProductId, VariationId};
use tracing::warn;

use super::CartError;
use crate::store::LocalStore;

const STORE_KEY: &str = "guest_cart";

/// The guest line list.
#[derive(Debug)]
pub struct GuestCart {
    store: LocalStore,
    lines: Vec<CartLine>,
}

impl GuestCart {
    /// Load the persisted guest cart, starting empty if none (or unreadable).
    #[must_use]
    pub fn load(store: LocalStore) -> Self {
        let lines = match store.get::<Vec<CartLine>>(STORE_KEY) {
            Ok(lines) => lines.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable guest cart");
                Vec::new()
            }
        };
        Self { store, lines }
    }

    /// Deterministic id of the guest line for a product and variation.
    #[must_use]
    pub fn line_id(product: &ProductId, variation: Option<&VariationId>) -> LineId {
        match variation {
            Some(variation) => LineId::new(format!("guest:{product}:{variation}")),
            None => LineId::new(format!("guest:{product}")),
        }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Currency of the guest lines (USD when empty).
    #[must_use]
    pub fn currency(&self) -> CurrencyCode {
        self.lines
            .first()
            .map_or_else(CurrencyCode::default, |line| line.unit_price.currency)
    }

    /// Add a line, merging into an existing line for the same product and
    /// variation.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrice` if the input carries no unit price, or a store
    /// error if the cart cannot be persisted.
    pub fn add(&mut self, new: &NewCartLine) -> Result<LineId, CartError> {
        let id = Self::line_id(&new.product_id, new.variation_id.as_ref());

        if let Some(existing) = self.lines.iter_mut().find(|line| line.id == id) {
            *existing = existing.with_quantity(existing.quantity.saturating_add(new.quantity));
        } else {
            let unit_price = new
                .unit_price
                .ok_or_else(|| CartError::MissingPrice(new.product_id.clone()))?;
            self.lines.push(CartLine {
                id: id.clone(),
                product_id: new.product_id.clone(),
                variation_id: new.variation_id.clone(),
                sku: new.sku.clone(),
                name: new.name.clone(),
                quantity: new.quantity,
                unit_price,
                line_total: unit_price.times(new.quantity),
                image: new.image.clone(),
            });
        }

        self.lines.retain(|line| line.quantity > 0);
        self.persist()?;
        Ok(id)
    }

    /// Set a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLine` for ids not in the guest cart.
    pub fn set_quantity(&mut self, id: &LineId, quantity: u32) -> Result<(), CartError> {
        let Some(index) = self.lines.iter().position(|line| &line.id == id) else {
            return Err(CartError::UnknownLine(id.clone()));
        };

        if quantity == 0 {
            self.lines.remove(index);
        } else {
            self.lines[index] = self.lines[index].with_quantity(quantity);
        }
        self.persist()
    }

    /// Drop the given lines (after they were merged into a server cart).
    ///
    /// # Errors
    ///
    /// Returns a store error if the cart cannot be persisted.
    pub fn discard(&mut self, ids: &[LineId]) -> Result<(), CartError> {
        self.lines.retain(|line| !ids.contains(&line.id));
        self.persist()
    }

    fn persist(&self) -> Result<(), CartError> {
        if self.lines.is_empty() {
            self.store.remove(STORE_KEY)?;
        } else {
            self.store.set(STORE_KEY, &self.lines)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use depot_core::Money;
    use rust_decimal::Decimal;

    use super::*;

    fn new_line(product: &str, qty: u32) -> NewCartLine {
        NewCartLine {
            product_id: ProductId::new(product),
            variation_id: None,
            quantity: qty,
            name: format!("Product {product}"),
            sku: None,
            unit_price: Some(Money::new(Decimal::new(250, 2), CurrencyCode::USD)),
            image: None,
        }
    }

    #[test]
    fn test_add_merges_same_product() {
        let mut cart = GuestCart::load(LocalStore::memory());
        let a = cart.add(&new_line("p1", 2)).unwrap();
        let b = cart.add(&new_line("p1", 3)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "guest:p1");
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
        assert_eq!(cart.lines()[0].line_total.to_string(), "$12.50");
    }

    #[test]
    fn test_variation_gets_its_own_line() {
        let mut cart = GuestCart::load(LocalStore::memory());
        cart.add(&new_line("p1", 1)).unwrap();
        let mut sized = new_line("p1", 1);
        sized.variation_id = Some(VariationId::new("xl"));
        let id = cart.add(&sized).unwrap();

        assert_eq!(id.as_str(), "guest:p1:xl");
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn test_zero_quantity_removes() {
        let mut cart = GuestCart::load(LocalStore::memory());
        let id = cart.add(&new_line("p1", 2)).unwrap();
        cart.set_quantity(&id, 0).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(
            cart.set_quantity(&id, 1),
            Err(CartError::UnknownLine(_))
        ));
    }

    #[test]
    fn test_missing_price_rejected() {
        let mut cart = GuestCart::load(LocalStore::memory());
        let mut line = new_line("p1", 1);
        line.unit_price = None;
        assert!(matches!(cart.add(&line), Err(CartError::MissingPrice(_))));
    }

    #[test]
    fn test_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::in_dir(dir.path());

        let mut cart = GuestCart::load(store.clone());
        cart.add(&new_line("p1", 4)).unwrap();

        let reloaded = GuestCart::load(store);
        assert_eq!(reloaded.lines().len(), 1);
        assert_eq!(reloaded.lines()[0].quantity, 4);
    }
}
