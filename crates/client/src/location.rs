//! Selected location context and location-scoped request attachment.
//!
//! A location (warehouse) scopes stock and pricing. The selection is
//! process-wide: it is persisted in the [`LocalStore`], restored at startup,
//! and broadcast to subscribers whenever it changes.
//!
//! Whether an outgoing request carries the selection is decided by
//! [`LocationPolicy`]: a fixed allow-list of path prefixes is scoped, every
//! other path is not unless the caller forces it. Nothing is attached when
//! no location is selected; absence means "all locations".

use std::sync::Arc;

use depot_core::LocationId;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::store::{LocalStore, StoreError};

/// Header carrying the selected location id.
pub const LOCATION_HEADER: &str = "x-location-id";

/// Store key for the persisted selection.
const STORE_KEY: &str = "location_id";

/// Path prefixes whose requests are scoped by the selected location.
pub const SCOPED_PREFIXES: &[&str] = &["/products", "/cart", "/checkout", "/search", "/filters"];

// =============================================================================
// LocationContext
// =============================================================================

/// Process-wide selected location.
///
/// Cheap to clone; all clones share the same selection.
#[derive(Clone, Debug)]
pub struct LocationContext {
    sender: Arc<watch::Sender<Option<LocationId>>>,
    store: LocalStore,
}

impl LocationContext {
    /// Create a context, restoring a persisted selection if present.
    ///
    /// A corrupt persisted value is logged and ignored.
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        let restored = match store.get::<LocationId>(STORE_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable persisted location");
                None
            }
        };
        let (sender, _) = watch::channel(restored);

        Self {
            sender: Arc::new(sender),
            store,
        }
    }

    /// The currently selected location, if any.
    #[must_use]
    pub fn current(&self) -> Option<LocationId> {
        self.sender.borrow().clone()
    }

    /// Select a location (`None` clears the selection).
    ///
    /// Subscribers are notified only when the selection actually changes.
    /// Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection cannot be persisted. The in-memory
    /// selection is updated regardless.
    pub fn select(&self, location: Option<LocationId>) -> Result<bool, StoreError> {
        let persisted = location.clone();
        let changed = self.sender.send_if_modified(|current| {
            if *current == location {
                false
            } else {
                *current = location;
                true
            }
        });

        if changed {
            debug!(location = ?persisted, "Location changed");
            match &persisted {
                Some(id) => self.store.set(STORE_KEY, id)?,
                None => self.store.remove(STORE_KEY)?,
            }
        }

        Ok(changed)
    }

    /// Subscribe to selection changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<LocationId>> {
        self.sender.subscribe()
    }
}

// =============================================================================
// LocationPolicy
// =============================================================================

/// Decides which requests carry the selected location.
#[derive(Clone, Debug)]
pub struct LocationPolicy {
    api_prefix: String,
}

impl LocationPolicy {
    /// Create a policy for an API mounted under `api_prefix` (e.g. `/api`).
    #[must_use]
    pub fn new(api_prefix: &str) -> Self {
        Self {
            api_prefix: crate::config::normalize_prefix(api_prefix),
        }
    }

    /// Whether `path` falls under one of the scoped prefixes.
    ///
    /// Accepts relative paths, prefixed paths and absolute URLs. Query
    /// strings and fragments are ignored, and prefixes match whole path
    /// segments only.
    #[must_use]
    pub fn is_scoped(&self, path: &str) -> bool {
        let path = self.route_path(path);
        SCOPED_PREFIXES.iter().any(|prefix| segment_prefix(&path, prefix))
    }

    /// The location to attach to a request for `path`, if any.
    #[must_use]
    pub fn resolve<'a>(
        &self,
        path: &str,
        force: bool,
        selected: Option<&'a LocationId>,
    ) -> Option<&'a LocationId> {
        let selected = selected?;
        (force || self.is_scoped(path)).then_some(selected)
    }

    /// Reduce a path or URL to the route below the API prefix.
    fn route_path(&self, path: &str) -> String {
        let path = if path.starts_with("http://") || path.starts_with("https://") {
            url::Url::parse(path).map_or_else(|_| String::new(), |url| url.path().to_string())
        } else {
            path.to_string()
        };

        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };

        if !self.api_prefix.is_empty() && segment_prefix(&path, &self.api_prefix) {
            let rest = &path[self.api_prefix.len()..];
            if rest.is_empty() {
                "/".to_string()
            } else {
                rest.to_string()
            }
        } else {
            path
        }
    }
}

/// `path` equals `prefix` or continues it with a `/`.
pub(crate) fn segment_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_prefixes() {
        let policy = LocationPolicy::new("/api");
        for path in [
            "/products",
            "/products/42",
            "products?page=2",
            "/api/cart",
            "/api/cart/update",
            "/checkout/bootstrap",
            "/search/suggest?q=bolt",
            "/filters",
            "http://shop.example/api/products/1",
        ] {
            assert!(policy.is_scoped(path), "{path} should be scoped");
        }
    }

    #[test]
    fn test_unscoped_paths() {
        let policy = LocationPolicy::new("/api");
        for path in [
            "/account/me",
            "/auth/login",
            "/locations",
            "/productsx",
            "/api/account/orders",
            "/api",
            "/cartography",
        ] {
            assert!(!policy.is_scoped(path), "{path} should not be scoped");
        }
    }

    #[test]
    fn test_prefix_is_segment_aware() {
        let policy = LocationPolicy::new("/api");
        // `/apix/products` is not under the `/api` prefix, and `/apix` is not scoped
        assert!(!policy.is_scoped("/apix/products"));
    }

    #[test]
    fn test_resolve_requires_selection() {
        let policy = LocationPolicy::new("/api");
        let id = LocationId::new("WH-1");

        assert_eq!(policy.resolve("/products", false, Some(&id)), Some(&id));
        assert_eq!(policy.resolve("/products", false, None), None);
        assert_eq!(policy.resolve("/account/me", false, Some(&id)), None);
        assert_eq!(policy.resolve("/account/me", true, Some(&id)), Some(&id));
        // Forcing never invents a location
        assert_eq!(policy.resolve("/account/me", true, None), None);
    }

    #[test]
    fn test_context_persists_and_restores() {
        let store = LocalStore::memory();
        let ctx = LocationContext::new(store.clone());
        assert_eq!(ctx.current(), None);

        assert!(ctx.select(Some(LocationId::new("WH-2"))).unwrap());
        assert_eq!(
            LocationContext::new(store.clone()).current(),
            Some(LocationId::new("WH-2"))
        );

        assert!(ctx.select(None).unwrap());
        assert_eq!(LocationContext::new(store).current(), None);
    }

    #[tokio::test]
    async fn test_context_broadcasts_only_changes() {
        let ctx = LocationContext::new(LocalStore::memory());
        let mut rx = ctx.subscribe();

        assert!(ctx.select(Some(LocationId::new("WH-1"))).unwrap());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(LocationId::new("WH-1")));

        assert!(!ctx.select(Some(LocationId::new("WH-1"))).unwrap());
        assert!(!rx.has_changed().unwrap());
    }
}
