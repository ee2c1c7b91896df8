//! Depot storefront client SDK.
//!
//! Everything a storefront front end needs to talk to the Depot gateway:
//!
//! - [`http::ApiClient`] - path normalization, cookie credentials, location
//!   attachment and 401 handling around `reqwest`
//! - [`location`] - the selected warehouse and the policy deciding which
//!   requests are scoped by it
//! - [`cart::CartSync`] - debounced, optimistic cart quantity edits
//!   reconciled against the server cart, with a local guest cart
//! - [`search::Suggestions`] - search-as-you-type where newer queries
//!   cancel older ones
//! - [`store::LocalStore`] - small JSON persistence for client state

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod error;
pub mod http;
pub mod location;
pub mod search;
pub mod session;
pub mod store;

pub use cart::{CartBackend, CartError, CartMode, CartSync, CartView, GuestCart, LineError, LineStatus};
pub use config::ClientConfig;
pub use error::ClientError;
pub use http::{ApiClient, ApiRequest, RequestOptions};
pub use location::{LocationContext, LocationPolicy};
pub use search::{SuggestionSource, Suggestions};
pub use session::{LogoutReason, SessionEvent};
pub use store::LocalStore;
