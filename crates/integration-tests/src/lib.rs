//! Integration tests for Depot.
//!
//! Each test starts a real gateway on an ephemeral port, backed by an
//! `httpmock` ERP and an in-memory session store, and drives it through
//! `depot-client` exactly as a storefront would. No database is needed:
//! the pool is lazy and only the readiness probe would touch it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p depot-integration-tests
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use depot_client::{ApiClient, CartSync, ClientConfig, GuestCart, LocalStore, LocationContext};
use depot_gateway::config::{ErpConfig, GatewayConfig};
use depot_gateway::middleware::session_layer;
use depot_gateway::state::AppState;
use httpmock::prelude::*;
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_sessions::MemoryStore;
use url::Url;

/// Debounce window used by test carts.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(40);

/// A running gateway with its mocked ERP.
pub struct TestContext {
    pub erp: MockServer,
    pub gateway_url: Url,
    server: JoinHandle<()>,
}

impl TestContext {
    /// Start the mock ERP and a gateway in front of it.
    ///
    /// # Panics
    ///
    /// Panics if the gateway cannot be started.
    pub async fn start() -> Self {
        let erp = MockServer::start_async().await;

        let config = GatewayConfig {
            database_url: SecretString::from("postgres://depot@127.0.0.1:1/depot"),
            host: [127, 0, 0, 1].into(),
            port: 0,
            base_url: "http://127.0.0.1".to_string(),
            erp: ErpConfig {
                base_url: Url::parse(&erp.url("/v1")).expect("mock ERP URL"),
                client_id: "gateway".to_string(),
                client_secret: SecretString::from("k3Y!9xQ#2mZ@7pL$"),
                timeout: Duration::from_secs(5),
            },
            sentry_dsn: None,
            sentry_environment: None,
        };
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://depot@127.0.0.1:1/depot")
            .expect("lazy pool");
        let state = AppState::new(config, pool).expect("gateway state");
        let app = depot_gateway::app(state, session_layer(MemoryStore::default(), false));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind gateway listener");
        let addr = listener.local_addr().expect("listener address");
        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("gateway server");
        });

        Self {
            erp,
            gateway_url: Url::parse(&format!("http://{addr}")).expect("gateway URL"),
            server,
        }
    }

    /// Client configuration pointing at this gateway.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.gateway_url.clone(),
            cart_debounce: TEST_DEBOUNCE,
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        }
    }

    /// A fresh storefront: API client plus a cart following its session.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn storefront(&self) -> (ApiClient, CartSync<ApiClient>) {
        let store = LocalStore::memory();
        let api = ApiClient::new(&self.client_config(), LocationContext::new(store.clone()))
            .expect("Failed to create API client");
        let cart = CartSync::new(api.clone(), GuestCart::load(store), TEST_DEBOUNCE);
        cart.follow_session(api.session_events());
        (api, cart)
    }

    /// Mock the password grant and profile lookup for `buyer@acme.test`.
    pub async fn mock_login(&self) {
        self.erp
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/oauth/token")
                    .body_contains("grant_type=password");
                then.status(200).json_body(json!({
                    "access_token": "cust-1",
                    "refresh_token": "r-1",
                    "expires_in": 3600
                }));
            })
            .await;
        self.erp
            .mock_async(|when, then| {
                when.method(GET).path("/v1/customers/me");
                then.status(200).json_body(json!({
                    "id": "c-42",
                    "email": "buyer@acme.test",
                    "name": "Pat Buyer",
                    "company": "Acme Fasteners"
                }));
            })
            .await;
    }

    /// Mock the client-credentials grant used for guest catalog calls.
    pub async fn mock_service_token(&self) {
        self.erp
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/oauth/token")
                    .body_contains("grant_type=client_credentials");
                then.status(200)
                    .json_body(json!({"access_token": "svc", "expires_in": 3600}));
            })
            .await;
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// ERP cart JSON with `(line_id, product_id, quantity, unit_price)` lines.
#[must_use]
pub fn erp_cart(lines: &[(&str, &str, u32, &str)]) -> Value {
    let lines: Vec<Value> = lines
        .iter()
        .map(|(id, product, quantity, price)| {
            json!({
                "id": id,
                "product_id": product,
                "name": format!("Product {product}"),
                "quantity": quantity,
                "unit_price": price
            })
        })
        .collect();
    json!({"currency": "USD", "lines": lines})
}
