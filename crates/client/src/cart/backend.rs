//! The network seam of cart sync.

use std::future::Future;
use std::sync::Arc;

use depot_core::{Cart, LineId, NewCartLine};

use crate::error::ClientError;
use crate::http::ApiClient;

/// Server-side cart operations.
///
/// Every mutation returns the authoritative cart after the change.
pub trait CartBackend: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Cart, ClientError>> + Send;

    fn add(&self, line: &NewCartLine) -> impl Future<Output = Result<Cart, ClientError>> + Send;

    fn update_quantity(
        &self,
        line: &LineId,
        quantity: u32,
    ) -> impl Future<Output = Result<Cart, ClientError>> + Send;

    fn remove(&self, line: &LineId) -> impl Future<Output = Result<Cart, ClientError>> + Send;
}

impl CartBackend for ApiClient {
    async fn fetch(&self) -> Result<Cart, ClientError> {
        self.cart().await
    }

    async fn add(&self, line: &NewCartLine) -> Result<Cart, ClientError> {
        self.add_to_cart(line).await
    }

    async fn update_quantity(&self, line: &LineId, quantity: u32) -> Result<Cart, ClientError> {
        self.update_cart_line(line, quantity).await
    }

    async fn remove(&self, line: &LineId) -> Result<Cart, ClientError> {
        self.remove_cart_line(line).await
    }
}

impl<B: CartBackend> CartBackend for Arc<B> {
    fn fetch(&self) -> impl Future<Output = Result<Cart, ClientError>> + Send {
        (**self).fetch()
    }

    fn add(&self, line: &NewCartLine) -> impl Future<Output = Result<Cart, ClientError>> + Send {
        (**self).add(line)
    }

    fn update_quantity(
        &self,
        line: &LineId,
        quantity: u32,
    ) -> impl Future<Output = Result<Cart, ClientError>> + Send {
        (**self).update_quantity(line, quantity)
    }

    fn remove(&self, line: &LineId) -> impl Future<Output = Result<Cart, ClientError>> + Send {
        (**self).remove(line)
    }
}
