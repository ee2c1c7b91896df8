//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `DEPOT_API_URL` - Gateway origin (default: `http://127.0.0.1:3000`)
//! - `DEPOT_API_PREFIX` - Path prefix of the gateway API (default: `/api`)
//! - `DEPOT_STATE_DIR` - Directory for persisted client state (guest cart,
//!   selected location). In-memory only when unset.
//! - `DEPOT_CART_DEBOUNCE_MS` - Cart quantity debounce window (default: 200)
//! - `DEPOT_TIMEOUT_SECS` - Request timeout (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway origin, e.g. `https://shop.example.com`
    pub base_url: Url,
    /// Path prefix all API paths live under (`/api`)
    pub api_prefix: String,
    /// Where guest cart and location selection are persisted
    pub state_dir: Option<PathBuf>,
    /// Quiet period before a cart quantity edit is sent
    pub cart_debounce: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is a valid URL"),
            api_prefix: "/api".to_string(),
            state_dir: None,
            cart_debounce: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let base_url = match get_optional_env("DEPOT_API_URL") {
            Some(raw) => Url::parse(&raw)
                .map_err(|e| ConfigError::InvalidEnvVar("DEPOT_API_URL".to_string(), e.to_string()))?,
            None => defaults.base_url,
        };
        let api_prefix = get_optional_env("DEPOT_API_PREFIX")
            .map_or(defaults.api_prefix, |p| normalize_prefix(&p));
        let state_dir = get_optional_env("DEPOT_STATE_DIR").map(PathBuf::from);
        let cart_debounce = Duration::from_millis(parse_env_or("DEPOT_CART_DEBOUNCE_MS", 200)?);
        let timeout = Duration::from_secs(parse_env_or("DEPOT_TIMEOUT_SECS", 30)?);

        Ok(Self {
            base_url,
            api_prefix,
            state_dir,
            cart_debounce,
            timeout,
        })
    }
}

/// Normalize an API prefix to `/segment` form; empty means "served at root".
#[must_use]
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_or(key: &str, default: u64) -> Result<u64, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
