//! Database migration commands.
//!
//! The gateway keeps no tables of its own; the only schema is the
//! `tower_sessions` session table.
//!
//! # Usage
//!
//! ```bash
//! depot-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `GATEWAY_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)

use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tower_sessions_sqlx_store::PostgresStore;
use tracing::info;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: GATEWAY_DATABASE_URL (or DATABASE_URL)")]
    MissingDatabaseUrl,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create or update the session table.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the database cannot be
/// reached, or the migration fails.
pub async fn sessions() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = database_url()?;

    info!("Connecting to gateway database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url.expose_secret())
        .await?;

    info!("Running session store migration...");
    PostgresStore::new(pool).migrate().await?;

    info!("Session store migration complete!");
    Ok(())
}

fn database_url() -> Result<SecretString, MigrationError> {
    ["GATEWAY_DATABASE_URL", "DATABASE_URL"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .map(SecretString::from)
        .ok_or(MigrationError::MissingDatabaseUrl)
}
