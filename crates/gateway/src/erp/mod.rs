//! ERP connector REST client.
//!
//! # Credentials
//!
//! - **Service token** - client-credentials grant, cached in the client and
//!   used for guest catalog calls and shared lookups (locations, filters)
//! - **Customer token** - password grant at login, kept in the session and
//!   passed in per call as [`Credential::Customer`]
//!
//! A 401 from the connector triggers one refresh (refresh-token grant for a
//! customer, a new client-credentials grant for the service token) and one
//! replay of the request. A second 401 surfaces as [`ErpError::Unauthorized`].
//!
//! # Caching
//!
//! Locations and filter groups are cached via `moka` (5 minute TTL), keyed
//! by location.

mod types;

pub use types::{CheckoutOptions, ErpToken};

use std::sync::Arc;
use std::time::Duration;

use depot_core::{
    Cart, CreateOrder, Customer, FilterGroup, LineId, Location, LocationId, NewCartLine,
    OrderConfirmation, Page, Product, ProductId, ProductSummary, Profile, ProfileUpdate,
    StockConflict, Suggestion,
};
use moka::future::Cache;
use reqwest::{Method, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ErpConfig;
use types::{AddLineBody, ErpCart, ErpErrorBody, ErpPage, QuantityBody, TokenResponse};

/// Query parameter carrying the selected location upstream.
pub const LOCATION_PARAM: &str = "location_id";

/// Errors that can occur when talking to the ERP connector.
#[derive(Debug, Error)]
pub enum ErpError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid ERP URL: {0}")]
    Url(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Token rejected, even after a refresh.
    #[error("Unauthorized")]
    Unauthorized,

    /// Password grant rejected.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token endpoint failure other than bad credentials.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Requested quantity exceeds available stock.
    #[error("Insufficient stock: {} available", .0.available)]
    StockConflict(StockConflict),

    /// Request rejected as invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rate limited by the connector.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("ERP returned {status}: {message}")]
    Upstream { status: u16, message: String },
}

/// Which bearer token to send.
pub enum Credential<'a> {
    /// The gateway's own service token.
    Service,
    /// A customer token from the session; replaced in place on refresh.
    Customer(&'a mut ErpToken),
}

impl Credential<'_> {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Customer(_) => "customer",
        }
    }
}

/// A request description that can be replayed after a token refresh.
struct ErpRequest {
    method: Method,
    url: Url,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Locations(Vec<Location>),
    Filters(Vec<FilterGroup>),
}

// =============================================================================
// ErpClient
// =============================================================================

/// Client for the ERP connector REST API.
#[derive(Clone)]
pub struct ErpClient {
    inner: Arc<ErpClientInner>,
}

struct ErpClientInner {
    client: reqwest::Client,
    base_url: Url,
    client_id: String,
    client_secret: SecretString,
    service_token: RwLock<Option<ErpToken>>,
    cache: Cache<String, CacheValue>,
}

impl std::fmt::Debug for ErpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErpClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("client_id", &self.inner.client_id)
            .finish_non_exhaustive()
    }
}

impl ErpClient {
    /// Create a new ERP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ErpConfig) -> Result<Self, ErpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("depot-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(ErpClientInner {
                client,
                base_url: config.base_url.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                service_token: RwLock::new(None),
                cache,
            }),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // OAuth
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange customer credentials for a token (password grant).
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` if the connector rejects the login.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn password_login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<ErpToken, ErpError> {
        self.token_grant(&[
            ("grant_type", "password"),
            ("username", email),
            ("password", password.expose_secret()),
        ])
        .await
        .map_err(|e| match e {
            ErpError::Upstream { status: 400 | 401, .. } => ErpError::InvalidCredentials,
            other => other,
        })
    }

    async fn refresh_customer(&self, token: &mut ErpToken) -> Result<(), ErpError> {
        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(ErpError::Unauthorized);
        };

        let mut refreshed = self
            .token_grant(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
            ])
            .await
            .map_err(|e| match e {
                ErpError::Upstream { status: 400 | 401, .. } => ErpError::Unauthorized,
                other => other,
            })?;

        // Connectors that do not rotate refresh tokens omit them on refresh
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        *token = refreshed;
        Ok(())
    }

    async fn fetch_service_token(&self) -> Result<String, ErpError> {
        let token = self
            .token_grant(&[("grant_type", "client_credentials")])
            .await?;
        let access_token = token.access_token.clone();
        *self.inner.service_token.write().await = Some(token);
        debug!("Service token issued");
        Ok(access_token)
    }

    async fn service_bearer(&self) -> Result<String, ErpError> {
        if let Some(token) = self.inner.service_token.read().await.as_ref()
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }
        self.fetch_service_token().await
    }

    async fn token_grant(&self, params: &[(&str, &str)]) -> Result<ErpToken, ErpError> {
        let url = self.endpoint(&["oauth", "token"])?;
        let mut form = vec![
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.expose_secret()),
        ];
        form.extend_from_slice(params);

        let response = self.inner.client.post(url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.is_client_error() {
                return Err(ErpError::Upstream {
                    status: status.as_u16(),
                    message: format!("Token grant failed: {text}"),
                });
            }
            return Err(ErpError::OAuth(format!("Token grant failed ({status}): {text}")));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(token_response.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request Execution
    // ─────────────────────────────────────────────────────────────────────────

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ErpError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ErpError::Url(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<ErpRequest, ErpError> {
        Ok(ErpRequest {
            method,
            url: self.endpoint(segments)?,
            query: Vec::new(),
            body: None,
        })
    }

    /// Send a request, refreshing the credential and replaying once on 401.
    #[instrument(
        skip(self, credential, request),
        fields(method = %request.method, path = %request.url.path(), credential = credential.kind())
    )]
    async fn send<T: DeserializeOwned>(
        &self,
        mut credential: Credential<'_>,
        request: ErpRequest,
    ) -> Result<T, ErpError> {
        let bearer = match &mut credential {
            Credential::Service => self.service_bearer().await?,
            Credential::Customer(token) => {
                if token.is_expired() && token.refresh_token.is_some() {
                    self.refresh_customer(token).await?;
                }
                token.access_token.clone()
            }
        };

        let response = self.dispatch(&request, &bearer).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response).await;
        }

        warn!("ERP rejected bearer token, refreshing once");
        let bearer = match &mut credential {
            Credential::Service => self.fetch_service_token().await?,
            Credential::Customer(token) => {
                self.refresh_customer(token).await?;
                token.access_token.clone()
            }
        };

        let response = self.dispatch(&request, &bearer).await?;
        decode(response).await
    }

    async fn dispatch(
        &self,
        request: &ErpRequest,
        bearer: &str,
    ) -> Result<reqwest::Response, ErpError> {
        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), request.url.clone())
            .bearer_auth(bearer)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Customer
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the signed-in customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn customer(&self, credential: Credential<'_>) -> Result<Customer, ErpError> {
        let request = self.request(Method::GET, &["customers", "me"])?;
        self.send(credential, request).await
    }

    /// Get the customer's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn profile(&self, credential: Credential<'_>) -> Result<Profile, ErpError> {
        let request = self.request(Method::GET, &["customers", "me", "profile"])?;
        self.send(credential, request).await
    }

    /// Update the customer's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn update_profile(
        &self,
        credential: Credential<'_>,
        update: &ProfileUpdate,
    ) -> Result<Profile, ErpError> {
        let mut request = self.request(Method::PUT, &["customers", "me", "profile"])?;
        request.body = Some(serde_json::to_value(update)?);
        self.send(credential, request).await
    }

    /// One page of an account listing (`orders`, `invoices`, `payments`,
    /// `ledger`, `addresses`, `documents`).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn account_page<T: DeserializeOwned>(
        &self,
        credential: Credential<'_>,
        kind: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<T>, ErpError> {
        let mut request = self.request(Method::GET, &["customers", "me", kind])?;
        request.query = vec![
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), per_page.to_string()),
        ];
        let page: ErpPage<T> = self.send(credential, request).await?;
        Ok(page.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cart
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the customer's current cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn cart(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
    ) -> Result<Cart, ErpError> {
        let request = with_location(self.request(Method::GET, &["carts", "current"])?, location);
        let cart: ErpCart = self.send(credential, request).await?;
        Ok(cart.into())
    }

    /// Add a line to the current cart.
    ///
    /// # Errors
    ///
    /// Returns `StockConflict` if the location cannot supply the quantity.
    pub async fn add_cart_line(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
        line: &NewCartLine,
    ) -> Result<Cart, ErpError> {
        let mut request = with_location(
            self.request(Method::POST, &["carts", "current", "lines"])?,
            location,
        );
        request.body = Some(serde_json::to_value(AddLineBody {
            product_id: &line.product_id,
            variation_id: line.variation_id.as_ref(),
            quantity: line.quantity,
        })?);
        let cart: ErpCart = self.send(credential, request).await?;
        Ok(cart.into())
    }

    /// Set the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns `StockConflict` if the location cannot supply the quantity.
    pub async fn update_cart_line(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<Cart, ErpError> {
        let mut request = with_location(
            self.request(
                Method::PATCH,
                &["carts", "current", "lines", line_id.as_str()],
            )?,
            location,
        );
        request.body = Some(serde_json::to_value(QuantityBody { quantity })?);
        let cart: ErpCart = self.send(credential, request).await?;
        Ok(cart.into())
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn remove_cart_line(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
        line_id: &LineId,
    ) -> Result<Cart, ErpError> {
        let request = with_location(
            self.request(
                Method::DELETE,
                &["carts", "current", "lines", line_id.as_str()],
            )?,
            location,
        );
        let cart: ErpCart = self.send(credential, request).await?;
        Ok(cart.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────

    /// Search and list products.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn products(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
        query: Vec<(String, String)>,
    ) -> Result<Page<ProductSummary>, ErpError> {
        let mut request = self.request(Method::GET, &["products"])?;
        request.query = query;
        let request = with_location(request, location);
        let page: ErpPage<ProductSummary> = self.send(credential, request).await?;
        Ok(page.into())
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist.
    pub async fn product(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
        id: &ProductId,
    ) -> Result<Product, ErpError> {
        let request = with_location(
            self.request(Method::GET, &["products", id.as_str()])?,
            location,
        );
        self.send(credential, request).await
    }

    /// Search suggestions for a partial query.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn suggestions(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
        q: &str,
    ) -> Result<Vec<Suggestion>, ErpError> {
        let mut request = self.request(Method::GET, &["search", "suggestions"])?;
        request.query = vec![("q".to_string(), q.to_string())];
        self.send(credential, with_location(request, location)).await
    }

    /// Filter groups for the listing at a location (cached).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn filters(&self, location: Option<&LocationId>) -> Result<Vec<FilterGroup>, ErpError> {
        let cache_key = format!("filters:{}", location.map_or("-", LocationId::as_str));
        if let Some(CacheValue::Filters(filters)) = self.inner.cache.get(&cache_key).await {
            debug!(cache_key = %cache_key, "Filters cache hit");
            return Ok(filters);
        }

        let request = with_location(
            self.request(Method::GET, &["products", "filters"])?,
            location,
        );
        let filters: Vec<FilterGroup> = self.send(Credential::Service, request).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Filters(filters.clone()))
            .await;
        Ok(filters)
    }

    /// All stock locations (cached).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn locations(&self) -> Result<Vec<Location>, ErpError> {
        let cache_key = "locations".to_string();
        if let Some(CacheValue::Locations(locations)) = self.inner.cache.get(&cache_key).await {
            return Ok(locations);
        }

        let request = self.request(Method::GET, &["locations"])?;
        let locations: Vec<Location> = self.send(Credential::Service, request).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Locations(locations.clone()))
            .await;
        Ok(locations)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checkout
    // ─────────────────────────────────────────────────────────────────────────

    /// Addresses, shipping methods and payment terms for checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn checkout_options(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
    ) -> Result<CheckoutOptions, ErpError> {
        let request = with_location(
            self.request(Method::GET, &["checkout", "options"])?,
            location,
        );
        self.send(credential, request).await
    }

    /// Place an order from the current cart.
    ///
    /// # Errors
    ///
    /// Returns `StockConflict` if stock ran out since the cart was built.
    pub async fn create_order(
        &self,
        credential: Credential<'_>,
        location: Option<&LocationId>,
        order: &CreateOrder,
    ) -> Result<OrderConfirmation, ErpError> {
        let mut request = with_location(self.request(Method::POST, &["orders"])?, location);
        request.body = Some(serde_json::to_value(order)?);
        self.send(credential, request).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn with_location(mut request: ErpRequest, location: Option<&LocationId>) -> ErpRequest {
    if let Some(location) = location {
        request
            .query
            .push((LOCATION_PARAM.to_string(), location.to_string()));
    }
    request
}

/// Map a connector response to a value or an error.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ErpError> {
    let status = response.status();
    if status.is_success() {
        let bytes = response.bytes().await?;
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let text = response.text().await.unwrap_or_default();
    let body: ErpErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .text()
        .map_or_else(|| truncate(&text), ToString::to_string);

    Err(match status {
        StatusCode::UNAUTHORIZED => ErpError::Unauthorized,
        StatusCode::NOT_FOUND => ErpError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY if body.available.is_some() => {
            let available = body.available.unwrap_or_default();
            let mut conflict = StockConflict::new(available);
            if let Some(text) = body.text() {
                conflict.message = text.to_string();
            }
            ErpError::StockConflict(conflict)
        }
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => ErpError::Validation(message),
        StatusCode::TOO_MANY_REQUESTS => ErpError::RateLimited(retry_after.unwrap_or(60)),
        _ => ErpError::Upstream {
            status: status.as_u16(),
            message,
        },
    })
}

fn truncate(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use depot_core::AddressId;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;
    use serde_json::json;

    use super::*;

    fn client_for(server: &MockServer) -> ErpClient {
        let config = ErpConfig {
            base_url: Url::parse(&server.url("/v1")).unwrap(),
            client_id: "gateway".to_string(),
            client_secret: SecretString::from("k3Y!9xQ#2mZ@7pL$"),
            timeout: Duration::from_secs(5),
        };
        ErpClient::new(&config).unwrap()
    }

    fn customer_token(access: &str) -> ErpToken {
        ErpToken {
            access_token: access.to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_in: Some(3600),
            obtained_at: chrono::Utc::now().timestamp(),
        }
    }

    fn cart_body() -> serde_json::Value {
        json!({
            "currency": "USD",
            "lines": [{"id": "l1", "product_id": "p1", "name": "Bolt", "quantity": 3, "unit_price": "1.50"}]
        })
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = ErpClient::new(&ErpConfig {
            base_url: Url::parse("https://erp.test/api/v1/").unwrap(),
            client_id: "gateway".to_string(),
            client_secret: SecretString::from("s"),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let url = client
            .endpoint(&["carts", "current", "lines", "a/b c"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://erp.test/api/v1/carts/current/lines/a%2Fb%20c"
        );
    }

    #[tokio::test]
    async fn test_service_token_is_cached() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/oauth/token")
                    .body_contains("grant_type=client_credentials");
                then.status(200)
                    .json_body(json!({"access_token": "svc-1", "expires_in": 3600}));
            })
            .await;
        let filters = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/products/filters")
                    .header("authorization", "Bearer svc-1");
                then.status(200).json_body(json!([]));
            })
            .await;

        let client = client_for(&server);
        let here = LocationId::new("1");
        let there = LocationId::new("2");
        client.filters(Some(&here)).await.unwrap();
        client.filters(Some(&there)).await.unwrap();
        client.filters(Some(&here)).await.unwrap();

        token.assert_hits_async(1).await;
        // Third call served from the per-location cache
        filters.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_customer_refresh_and_replay_once() {
        let server = MockServer::start_async().await;
        let stale = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/carts/current")
                    .header("authorization", "Bearer stale");
                then.status(401);
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/oauth/token")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=refresh-1");
                then.status(200)
                    .json_body(json!({"access_token": "fresh", "expires_in": 3600}));
            })
            .await;
        let fresh = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/carts/current")
                    .query_param("location_id", "7")
                    .header("authorization", "Bearer fresh");
                then.status(200).json_body(cart_body());
            })
            .await;

        let client = client_for(&server);
        let mut token = customer_token("stale");
        let cart = client
            .cart(Credential::Customer(&mut token), Some(&LocationId::new("7")))
            .await
            .unwrap();

        assert_eq!(cart.item_count, 3);
        assert_eq!(token.access_token, "fresh");
        // Kept when the connector does not rotate it
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
        stale.assert_hits_async(1).await;
        refresh.assert_hits_async(1).await;
        fresh.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_second_unauthorized_surfaces() {
        let server = MockServer::start_async().await;
        let cart = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/carts/current");
                then.status(401);
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/oauth/token");
                then.status(200)
                    .json_body(json!({"access_token": "fresh", "refresh_token": "refresh-2"}));
            })
            .await;

        let client = client_for(&server);
        let mut token = customer_token("stale");
        let result = client.cart(Credential::Customer(&mut token), None).await;

        assert!(matches!(result, Err(ErpError::Unauthorized)));
        cart.assert_hits_async(2).await;
        refresh.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_service_refresh_and_replay_once() {
        let server = MockServer::start_async().await;
        let grant = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/oauth/token")
                    .body_contains("grant_type=client_credentials");
                then.status(200)
                    .json_body(json!({"access_token": "svc-new", "expires_in": 3600}));
            })
            .await;
        let revoked = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/locations")
                    .header("authorization", "Bearer svc-old");
                then.status(401);
            })
            .await;
        let accepted = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/locations")
                    .header("authorization", "Bearer svc-new");
                then.status(200)
                    .json_body(json!([{"id": "WH-01", "name": "Main"}]));
            })
            .await;
        let filters = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/products/filters")
                    .header("authorization", "Bearer svc-new");
                then.status(200).json_body(json!([]));
            })
            .await;

        let client = client_for(&server);
        // Still valid locally, but revoked by the connector
        *client.inner.service_token.write().await = Some(customer_token("svc-old"));

        let locations = client.locations().await.unwrap();
        assert_eq!(locations.len(), 1);
        grant.assert_hits_async(1).await;
        revoked.assert_hits_async(1).await;
        accepted.assert_hits_async(1).await;

        // The new token is kept for later service calls
        client.filters(None).await.unwrap();
        grant.assert_hits_async(1).await;
        filters.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_service_second_unauthorized_surfaces() {
        let server = MockServer::start_async().await;
        let grant = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/oauth/token")
                    .body_contains("grant_type=client_credentials");
                then.status(200)
                    .json_body(json!({"access_token": "svc", "expires_in": 3600}));
            })
            .await;
        let locations = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/locations");
                then.status(401);
            })
            .await;

        let client = client_for(&server);
        let result = client.locations().await;

        assert!(matches!(result, Err(ErpError::Unauthorized)));
        // One grant for the first call, one for the single replay
        grant.assert_hits_async(2).await;
        locations.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_create_order_posts_body_with_location() {
        let server = MockServer::start_async().await;
        let order = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/orders")
                    .query_param("location_id", "7")
                    .header("authorization", "Bearer live")
                    .json_body(json!({"shipping_address_id": "a1", "shipping_method": "ltl"}));
                then.status(201)
                    .json_body(json!({"order_id": "o-1", "order_number": "SO-1001"}));
            })
            .await;

        let client = client_for(&server);
        let mut token = customer_token("live");
        let request = CreateOrder {
            shipping_address_id: AddressId::new("a1"),
            billing_address_id: None,
            shipping_method: Some("ltl".to_string()),
            po_number: None,
            notes: None,
        };
        let confirmation = client
            .create_order(
                Credential::Customer(&mut token),
                Some(&LocationId::new("7")),
                &request,
            )
            .await
            .unwrap();

        assert_eq!(confirmation.order_number, "SO-1001");
        order.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_create_order_stock_conflict() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/orders");
                then.status(409).json_body(json!({"available": 0}));
            })
            .await;

        let client = client_for(&server);
        let mut token = customer_token("live");
        let request = CreateOrder {
            shipping_address_id: AddressId::new("a1"),
            billing_address_id: None,
            shipping_method: None,
            po_number: None,
            notes: None,
        };
        let err = client
            .create_order(Credential::Customer(&mut token), None, &request)
            .await
            .unwrap_err();

        assert!(matches!(err, ErpError::StockConflict(c) if c.available == 0));
    }

    #[tokio::test]
    async fn test_stock_conflict_mapped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/v1/carts/current/lines/l1")
                    .json_body(json!({"quantity": 50}));
                then.status(422)
                    .json_body(json!({"error": "insufficient_stock", "available": 12}));
            })
            .await;

        let client = client_for(&server);
        let mut token = customer_token("live");
        let err = client
            .update_cart_line(
                Credential::Customer(&mut token),
                None,
                &LineId::new("l1"),
                50,
            )
            .await
            .unwrap_err();

        let ErpError::StockConflict(conflict) = err else {
            panic!("expected stock conflict, got {err:?}");
        };
        assert_eq!(conflict.available, 12);
        assert_eq!(conflict.message, "insufficient_stock");
    }

    #[tokio::test]
    async fn test_password_login_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/oauth/token")
                    .body_contains("grant_type=password");
                then.status(401).json_body(json!({"error": "invalid_grant"}));
            })
            .await;

        let client = client_for(&server);
        let result = client
            .password_login("buyer@acme.test", &SecretString::from("wrong"))
            .await;
        assert!(matches!(result, Err(ErpError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_not_found_and_upstream() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/v1/oauth/token");
                then.status(200).json_body(json!({"access_token": "svc"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/products/missing");
                then.status(404).json_body(json!({"message": "No such product"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/locations");
                then.status(503).body("maintenance");
            })
            .await;

        let client = client_for(&server);
        let missing = client
            .product(Credential::Service, None, &ProductId::new("missing"))
            .await;
        assert!(matches!(missing, Err(ErpError::NotFound(m)) if m == "No such product"));

        let down = client.locations().await;
        assert!(matches!(
            down,
            Err(ErpError::Upstream { status: 503, message }) if message == "maintenance"
        ));
    }
}
