//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::GatewayConfig;
use crate::erp::{ErpClient, ErpError};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the database pool and the ERP client.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: GatewayConfig,
    pool: PgPool,
    erp: ErpClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the ERP HTTP client cannot be built.
    pub fn new(config: GatewayConfig, pool: PgPool) -> Result<Self, ErpError> {
        let erp = ErpClient::new(&config.erp)?;

        Ok(Self {
            inner: Arc::new(AppStateInner { config, pool, erp }),
        })
    }

    /// Get a reference to the gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the ERP connector client.
    #[must_use]
    pub fn erp(&self) -> &ErpClient {
        &self.inner.erp
    }
}
