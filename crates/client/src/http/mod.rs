//! HTTP client wrapper around the gateway API.
//!
//! [`ApiClient`] owns one `reqwest` client with a cookie store, so the
//! gateway session cookie rides along on every request. It normalizes
//! relative paths onto the API prefix, applies the [`LocationPolicy`], and
//! classifies responses into the three error categories the storefront
//! distinguishes: unauthorized (with a logout broadcast), stock conflict and
//! generic failure.

mod endpoints;

use std::sync::Arc;

use depot_core::StockConflict;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::location::{LOCATION_HEADER, LocationContext, LocationPolicy, segment_prefix};
use crate::session::{self, LogoutReason, SessionEvent};

/// Longest body excerpt used as an error message.
const MAX_MESSAGE_LEN: usize = 200;

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the Depot gateway API.
///
/// Cheap to clone; clones share the connection pool, cookie jar, location
/// context and session channel.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    api_prefix: String,
    policy: LocationPolicy,
    location: LocationContext,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("api_prefix", &self.inner.api_prefix)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for the gateway described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig, location: LocationContext) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(concat!("depot-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.clone(),
                api_prefix: crate::config::normalize_prefix(&config.api_prefix),
                policy: LocationPolicy::new(&config.api_prefix),
                location,
                events: session::channel(),
            }),
        })
    }

    /// The location context requests are scoped by.
    #[must_use]
    pub fn location(&self) -> &LocationContext {
        &self.inner.location
    }

    /// The location attachment policy.
    #[must_use]
    pub fn policy(&self) -> &LocationPolicy {
        &self.inner.policy
    }

    /// Subscribe to session lifecycle events.
    #[must_use]
    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve a path to a full URL.
    ///
    /// Relative paths (`products`, `/products`) are placed under the API
    /// prefix; paths already under it are kept; absolute `http(s)` URLs
    /// pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is not a valid URL.
    pub fn url_for(&self, path: &str) -> Result<Url, ClientError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let route = path.split(['?', '#']).next().unwrap_or_default();
        let full = if self.inner.api_prefix.is_empty()
            || segment_prefix(route, &self.inner.api_prefix)
        {
            path
        } else {
            format!("{}{path}", self.inner.api_prefix)
        };

        Ok(self.inner.base_url.join(&full)?)
    }

    /// Start a `GET` request.
    #[must_use]
    pub fn get(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::GET, path)
    }

    /// Start a `POST` request.
    #[must_use]
    pub fn post(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::POST, path)
    }

    /// Start a `PUT` request.
    #[must_use]
    pub fn put(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::PUT, path)
    }

    /// Start a `DELETE` request.
    #[must_use]
    pub fn delete(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::DELETE, path)
    }

    /// Start a request with an arbitrary method.
    #[must_use]
    pub fn request(&self, method: Method, path: impl Into<String>) -> ApiRequest<'_> {
        ApiRequest {
            client: self,
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub(crate) fn broadcast(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    /// Map a non-success response to a [`ClientError`].
    async fn classify(
        &self,
        response: reqwest::Response,
        options: RequestOptions,
    ) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            if !options.quiet_unauthorized {
                warn!(url = %response.url(), "Session rejected by gateway, broadcasting logout");
                self.broadcast(SessionEvent::LoggedOut(LogoutReason::Unauthorized));
            }
            return Err(ClientError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::CONFLICT
            && let Ok(conflict) = serde_json::from_str::<StockConflict>(&body)
        {
            let conflict = if conflict.message.is_empty() {
                StockConflict::new(conflict.available)
            } else {
                conflict
            };
            return Err(ClientError::StockConflict(conflict));
        }

        let message = error_message(&body, status);
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(message));
        }

        debug!(status = %status, message = %message, "Gateway returned error status");
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull a human-readable message out of an error body.
///
/// Prefers a JSON `message` or `error` string, then the raw text, then the
/// status reason.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = value.get(key).and_then(serde_json::Value::as_str)
                && !text.is_empty()
            {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    } else {
        trimmed.chars().take(MAX_MESSAGE_LEN).collect()
    }
}

// =============================================================================
// ApiRequest
// =============================================================================

/// Per-request options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Attach the selected location even if the path is not scoped.
    pub force_location: bool,
    /// Do not broadcast a logout on 401 (used by login, where 401 means
    /// bad credentials rather than an expired session).
    pub quiet_unauthorized: bool,
}

/// A request being built against the gateway.
#[must_use = "requests do nothing until sent"]
pub struct ApiRequest<'a> {
    client: &'a ApiClient,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    options: RequestOptions,
}

impl ApiRequest<'_> {
    /// Add one query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add several query parameters.
    pub fn query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach the selected location regardless of the path.
    pub const fn force_location(mut self) -> Self {
        self.options.force_location = true;
        self
    }

    /// Replace all request options.
    pub const fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Send the request, returning the successful response.
    ///
    /// # Errors
    ///
    /// Returns the classified error for transport failures and non-2xx
    /// responses.
    pub async fn send(self) -> Result<reqwest::Response, ClientError> {
        let client = self.client;
        let url = client.url_for(&self.path)?;

        let mut builder = client.inner.client.request(self.method.clone(), url);
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }

        let selected = client.inner.location.current();
        if let Some(location) =
            client
                .inner
                .policy
                .resolve(&self.path, self.options.force_location, selected.as_ref())
        {
            builder = builder.header(LOCATION_HEADER, location.as_str());
        }

        if let Some(body) = &self.body {
            builder = builder.json(body);
        }

        debug!(method = %self.method, path = %self.path, "Sending gateway request");
        let response = builder.send().await?;
        client.classify(response, self.options).await
    }

    /// Send the request and decode a JSON response.
    ///
    /// # Errors
    ///
    /// Returns the classified error, or a JSON error if the body does not
    /// decode as `T`.
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let response = self.send().await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send the request and discard the response body.
    ///
    /// # Errors
    ///
    /// Returns the classified error.
    pub async fn execute(self) -> Result<(), ClientError> {
        self.send().await.map(drop)
    }
}

/// Percent-encode a single path segment.
pub(crate) fn segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
