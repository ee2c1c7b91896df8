//! Optimistic cart-quantity sync.
//!
//! A shopper may change a quantity several times in quick succession.
//! [`CartSync`] shows every change immediately, waits for a pause in the
//! edits (the debounce window), and only then sends the latest quantity to
//! the server. The server reply is authoritative and replaces the local
//! lines; a rejected update restores the line as it was before the burst of
//! edits and records a [`LineError`] for it.
//!
//! Per line: `Idle -> PendingEdit -> Updating -> Idle` (with or without an
//! error). At most one request per line is in flight. Edits made while a
//! request is in flight are kept and sent, debounced, once it settles; they
//! do not change the displayed quantity until then.
//!
//! Signed-out shoppers use the local [`GuestCart`]: edits apply directly and
//! nothing is sent until sign-in merges the guest lines into the server cart.

mod backend;
mod guest;
mod line;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use depot_core::{Cart, CartLine, CurrencyCode, LineId, NewCartLine, ProductId};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

pub use backend::CartBackend;
pub use guest::GuestCart;
pub use line::{CartMode, CartView, LineError, LineStatus, LineView};

use crate::error::ClientError;
use crate::session::SessionEvent;
use crate::store::StoreError;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Unknown cart line: {0}")]
    UnknownLine(LineId),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Product {0} has no price to add it to a guest cart")]
    MissingPrice(ProductId),

    #[error("Server cart does not contain product {0} after adding it")]
    NotAdded(ProductId),
}

/// Outcome of merging the guest cart at sign-in.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Guest lines accepted by the server.
    pub merged: usize,
    /// Guest lines the server refused; they stay in the guest cart.
    pub rejected: Vec<(CartLine, LineError)>,
}

// =============================================================================
// State
// =============================================================================

/// Sync bookkeeping of one line.
#[derive(Debug, Default)]
struct LineSync {
    /// The line before the current burst of edits, restored on failure.
    snapshot: Option<CartLine>,
    /// Latest requested quantity not yet sent.
    desired: Option<u32>,
    timer: Option<JoinHandle<()>>,
    in_flight: bool,
    error: Option<LineError>,
}

impl LineSync {
    const fn status(&self) -> LineStatus {
        if self.in_flight {
            LineStatus::Updating
        } else if self.desired.is_some() || self.timer.is_some() {
            LineStatus::PendingEdit
        } else {
            LineStatus::Idle
        }
    }

    const fn is_settled(&self) -> bool {
        !self.in_flight && self.desired.is_none() && self.timer.is_none() && self.error.is_none()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug)]
struct SyncState {
    mode: CartMode,
    /// Bumped on every mode switch so replies to a previous session are dropped.
    epoch: u64,
    /// Displayed server lines (authenticated mode).
    lines: Vec<CartLine>,
    currency: CurrencyCode,
    guest: GuestCart,
    entries: HashMap<LineId, LineSync>,
}

impl SyncState {
    fn line_mut(&mut self, id: &LineId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|line| &line.id == id)
    }

    /// Put a line back, in place if still present.
    fn restore_line(&mut self, line: CartLine) {
        if let Some(current) = self.line_mut(&line.id) {
            *current = line;
        } else {
            self.lines.push(line);
        }
    }

    /// Replace the displayed lines with the server's, keeping unsent and
    /// in-flight edits of other lines on top.
    fn reconcile(&mut self, cart: Cart) {
        self.currency = cart.currency();
        let previous = std::mem::replace(&mut self.lines, cart.lines);

        let lines = &mut self.lines;
        self.entries.retain(|id, entry| {
            let Some(server) = lines.iter_mut().find(|line| &line.id == id) else {
                // Line is gone server-side; nothing left to edit or restore
                if entry.in_flight {
                    entry.snapshot = None;
                    entry.desired = None;
                    return true;
                }
                entry.cancel_timer();
                return false;
            };

            if entry.in_flight {
                // Keep showing what is being sent; roll back to fresh truth on failure
                entry.snapshot = Some(server.clone());
                if let Some(shown) = previous.iter().find(|line| &line.id == id) {
                    *server = server.with_quantity(shown.quantity);
                }
            } else if let Some(quantity) = entry.desired {
                entry.snapshot = Some(server.clone());
                *server = server.with_quantity(quantity);
            } else {
                entry.snapshot = None;
            }
            true
        });
    }

    fn prune(&mut self) {
        self.entries.retain(|_, entry| !entry.is_settled());
    }

    /// Whether any line, displayed or not, has an edit pending or in flight.
    fn syncing(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.status() != LineStatus::Idle)
    }

    fn view(&self) -> CartView {
        match self.mode {
            CartMode::Guest => {
                let cart = Cart::from_lines(self.guest.lines().to_vec(), self.guest.currency());
                CartView {
                    mode: CartMode::Guest,
                    lines: cart
                        .lines
                        .into_iter()
                        .map(|line| LineView {
                            line,
                            status: LineStatus::Idle,
                            error: None,
                        })
                        .collect(),
                    subtotal: cart.subtotal,
                    item_count: cart.item_count,
                    syncing: false,
                }
            }
            CartMode::Authenticated => {
                let cart = Cart::from_lines(self.lines.clone(), self.currency);
                CartView {
                    mode: CartMode::Authenticated,
                    lines: cart
                        .lines
                        .into_iter()
                        .map(|line| {
                            let entry = self.entries.get(&line.id);
                            LineView {
                                status: entry.map_or(LineStatus::Idle, LineSync::status),
                                error: entry.and_then(|e| e.error),
                                line,
                            }
                        })
                        .collect(),
                    subtotal: cart.subtotal,
                    item_count: cart.item_count,
                    syncing: self.syncing(),
                }
            }
        }
    }
}

// =============================================================================
// CartSync
// =============================================================================

/// Debounced, optimistic cart sync over a [`CartBackend`].
///
/// Cheap to clone; clones drive the same cart.
pub struct CartSync<B: CartBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: CartBackend> Clone for CartSync<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<B> {
    backend: B,
    debounce: Duration,
    state: Mutex<SyncState>,
    view: watch::Sender<CartView>,
}

impl<B: CartBackend> CartSync<B> {
    /// Create a cart in guest mode over the given guest cart.
    #[must_use]
    pub fn new(backend: B, guest: GuestCart, debounce: Duration) -> Self {
        let state = SyncState {
            mode: CartMode::Guest,
            epoch: 0,
            lines: Vec::new(),
            currency: CurrencyCode::default(),
            guest,
            entries: HashMap::new(),
        };
        let (view, _) = watch::channel(state.view());

        Self {
            inner: Arc::new(Inner {
                backend,
                debounce,
                state: Mutex::new(state),
                view,
            }),
        }
    }

    /// The current cart view.
    #[must_use]
    pub fn view(&self) -> CartView {
        self.inner.view.borrow().clone()
    }

    /// Subscribe to cart view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartView> {
        self.inner.view.subscribe()
    }

    /// Current mode.
    pub async fn mode(&self) -> CartMode {
        self.inner.state.lock().await.mode
    }

    fn publish(&self, state: &SyncState) {
        self.inner.view.send_replace(state.view());
    }

    /// Reload the server cart (no-op for guests beyond republishing).
    ///
    /// # Errors
    ///
    /// Returns an error if the server cart cannot be fetched.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), CartError> {
        let epoch = {
            let state = self.inner.state.lock().await;
            if state.mode == CartMode::Guest {
                self.publish(&state);
                return Ok(());
            }
            state.epoch
        };

        let cart = self.inner.backend.fetch().await?;

        let mut state = self.inner.state.lock().await;
        if state.epoch == epoch {
            state.reconcile(cart);
            self.publish(&state);
        }
        Ok(())
    }

    /// Add a product to the cart.
    ///
    /// Guests merge into the local list. Signed-in customers add on the
    /// server and the returned cart replaces the local lines.
    ///
    /// # Errors
    ///
    /// Returns `StockConflict` (via `Client`) when the server refuses the
    /// quantity, or `MissingPrice` for guest lines without a price.
    #[instrument(skip(self, line), fields(product_id = %line.product_id, quantity = line.quantity))]
    pub async fn add(&self, line: NewCartLine) -> Result<LineId, CartError> {
        let epoch = {
            let mut state = self.inner.state.lock().await;
            if state.mode == CartMode::Guest {
                let id = state.guest.add(&line)?;
                self.publish(&state);
                return Ok(id);
            }
            state.epoch
        };

        let cart = self.inner.backend.add(&line).await?;
        let id = cart
            .lines
            .iter()
            .rev()
            .find(|l| l.product_id == line.product_id && l.variation_id == line.variation_id)
            .map(|l| l.id.clone());

        let mut state = self.inner.state.lock().await;
        if state.epoch == epoch {
            state.reconcile(cart);
            self.publish(&state);
        }
        id.ok_or(CartError::NotAdded(line.product_id))
    }

    /// Request a new quantity for a line; zero removes it.
    ///
    /// Returns once the edit is recorded. The displayed quantity changes
    /// immediately unless an update of this line is in flight, in which
    /// case the edit is queued behind it.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLine` if the line is not in the cart.
    #[instrument(skip(self, id), fields(line_id = %id))]
    pub async fn set_quantity(&self, id: &LineId, quantity: u32) -> Result<(), CartError> {
        let mut state = self.inner.state.lock().await;

        if state.mode == CartMode::Guest {
            state.guest.set_quantity(id, quantity)?;
            self.publish(&state);
            return Ok(());
        }

        let SyncState { lines, entries, .. } = &mut *state;
        let Some(line) = lines.iter_mut().find(|line| &line.id == id) else {
            return Err(CartError::UnknownLine(id.clone()));
        };

        let entry = entries.entry(id.clone()).or_default();
        entry.error = None;
        entry.desired = Some(quantity);

        if entry.in_flight {
            debug!(quantity, "Update in flight, queueing edit");
        } else {
            if entry.snapshot.is_none() {
                entry.snapshot = Some(line.clone());
            }
            *line = line.with_quantity(quantity);
            entry.cancel_timer();
            entry.timer = Some(self.spawn_timer(id.clone()));
        }

        self.publish(&state);
        Ok(())
    }

    /// Remove a line (quantity zero).
    ///
    /// # Errors
    ///
    /// Returns `UnknownLine` if the line is not in the cart.
    pub async fn remove(&self, id: &LineId) -> Result<(), CartError> {
        self.set_quantity(id, 0).await
    }

    /// Dismiss the error shown on a line.
    pub async fn clear_error(&self, id: &LineId) {
        let mut state = self.inner.state.lock().await;
        if let Some(entry) = state.entries.get_mut(id) {
            entry.error = None;
        }
        state.prune();
        self.publish(&state);
    }

    /// Send every pending edit now instead of waiting out the debounce.
    pub async fn flush(&self) {
        let pending: Vec<LineId> = {
            let state = self.inner.state.lock().await;
            state
                .entries
                .iter()
                .filter(|(_, entry)| entry.desired.is_some() && !entry.in_flight)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in pending {
            self.flush_line(id, false).await;
        }
    }

    /// Wait until no line has an edit pending or in flight.
    pub async fn settled(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this only ends by matching
        let _ = rx.wait_for(|view| !view.is_busy()).await;
    }

    fn spawn_timer(&self, id: LineId) -> JoinHandle<()> {
        let sync = self.clone();
        let delay = self.inner.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sync.flush_line(id, true).await;
        })
    }

    /// Send the latest desired quantity of one line and reconcile.
    async fn flush_line(&self, id: LineId, from_timer: bool) {
        let (quantity, epoch) = {
            let mut state = self.inner.state.lock().await;
            if state.mode != CartMode::Authenticated {
                return;
            }
            let epoch = state.epoch;
            let Some(entry) = state.entries.get_mut(&id) else {
                return;
            };

            // The timer task must not abort itself
            match entry.timer.take() {
                Some(timer) if !from_timer => timer.abort(),
                _ => {}
            }
            if entry.in_flight {
                return;
            }
            let Some(quantity) = entry.desired.take() else {
                return;
            };
            entry.in_flight = true;

            self.publish(&state);
            (quantity, epoch)
        };

        debug!(line_id = %id, quantity, "Sending cart quantity");
        let result = if quantity == 0 {
            self.inner.backend.remove(&id).await
        } else {
            self.inner.backend.update_quantity(&id, quantity).await
        };

        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            debug!(line_id = %id, "Dropping reply from a previous session");
            return;
        }

        match result {
            Ok(cart) => {
                if let Some(entry) = state.entries.get_mut(&id) {
                    entry.in_flight = false;
                    entry.snapshot = None;
                    entry.error = None;
                }
                state.reconcile(cart);
            }
            Err(err) => {
                warn!(line_id = %id, quantity, error = %err, "Cart update rejected, rolling back");
                if state.line_mut(&id).is_none() {
                    // Removed server-side meanwhile; there is nothing to roll back to
                    state.entries.remove(&id);
                } else {
                    let snapshot = state.entries.get_mut(&id).and_then(|entry| {
                        entry.in_flight = false;
                        entry.error = Some(LineError::from(&err));
                        entry.snapshot.take()
                    });
                    if let Some(snapshot) = snapshot {
                        state.restore_line(snapshot);
                    }
                }
            }
        }

        self.resume_queued(&mut state, &id);
        state.prune();
        self.publish(&state);
    }

    /// Start the debounce for an edit queued while the line was in flight.
    fn resume_queued(&self, state: &mut SyncState, id: &LineId) {
        let SyncState { lines, entries, .. } = state;
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        let Some(quantity) = entry.desired else {
            return;
        };
        if entry.in_flight || entry.timer.is_some() {
            return;
        }

        let Some(line) = lines.iter_mut().find(|line| &line.id == id) else {
            entry.desired = None;
            return;
        };
        if entry.snapshot.is_none() {
            entry.snapshot = Some(line.clone());
        }
        *line = line.with_quantity(quantity);
        entry.timer = Some(self.spawn_timer(id.clone()));
    }

    /// Switch to the server cart, merging guest lines into it.
    ///
    /// Guest lines the server accepts leave the guest cart; refused ones
    /// stay there and are reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cart cannot be fetched afterwards.
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<MergeOutcome, CartError> {
        let (guest_lines, epoch) = {
            let mut state = self.inner.state.lock().await;
            for entry in state.entries.values_mut() {
                entry.cancel_timer();
            }
            state.entries.clear();
            state.lines.clear();
            state.mode = CartMode::Authenticated;
            state.epoch += 1;
            (state.guest.lines().to_vec(), state.epoch)
        };

        let mut outcome = MergeOutcome::default();
        let mut merged_ids = Vec::new();
        for line in guest_lines {
            let new = NewCartLine {
                product_id: line.product_id.clone(),
                variation_id: line.variation_id.clone(),
                quantity: line.quantity,
                name: line.name.clone(),
                sku: line.sku.clone(),
                unit_price: Some(line.unit_price),
                image: line.image.clone(),
            };
            match self.inner.backend.add(&new).await {
                Ok(_) => {
                    merged_ids.push(line.id.clone());
                    outcome.merged += 1;
                }
                Err(err) => {
                    warn!(product_id = %line.product_id, error = %err, "Guest line not merged");
                    let error = LineError::from(&err);
                    outcome.rejected.push((line, error));
                }
            }
        }

        if !merged_ids.is_empty() {
            self.inner.state.lock().await.guest.discard(&merged_ids)?;
        }

        let cart = self.inner.backend.fetch().await?;
        let mut state = self.inner.state.lock().await;
        if state.epoch == epoch {
            state.reconcile(cart);
            self.publish(&state);
        }
        Ok(outcome)
    }

    /// Switch to the guest cart, dropping server state and pending edits.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let mut state = self.inner.state.lock().await;
        for entry in state.entries.values_mut() {
            entry.cancel_timer();
        }
        state.entries.clear();
        state.lines.clear();
        state.mode = CartMode::Guest;
        state.epoch += 1;
        self.publish(&state);
    }

    /// Follow session events: sign in on login, fall back to the guest
    /// cart on any logout.
    pub fn follow_session(&self, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let sync = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::LoggedIn(customer)) => {
                        debug!(customer_id = %customer.id, "Session started, loading server cart");
                        if let Err(e) = sync.sign_in().await {
                            warn!(error = %e, "Failed to load server cart after sign-in");
                        }
                    }
                    Ok(SessionEvent::LoggedOut(reason)) => {
                        debug!(?reason, "Session ended, switching to guest cart");
                        sync.sign_out().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use depot_core::{Customer, Email, Money, StockConflict};
    use rust_decimal::Decimal;

    use super::*;
    use crate::session::LogoutReason;
    use crate::store::LocalStore;

    const DEBOUNCE: Duration = Duration::from_millis(200);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Fetch,
        Add(ProductId, u32),
        Update(LineId, u32),
        Remove(LineId),
    }

    #[derive(Default)]
    struct FakeState {
        lines: Vec<CartLine>,
        calls: Vec<Call>,
        /// Next update fails with a stock conflict for this many units.
        conflict: Option<u32>,
        /// Cap applied by the "server" to every update.
        max_quantity: Option<u32>,
        latency: Duration,
    }

    #[derive(Default)]
    struct FakeBackend {
        state: StdMutex<FakeState>,
    }

    impl FakeBackend {
        fn with_lines(lines: Vec<CartLine>) -> Arc<Self> {
            let fake = Self::default();
            fake.state.lock().unwrap().lines = lines;
            Arc::new(fake)
        }

        fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        fn mutation_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| *call != Call::Fetch)
                .collect()
        }

        fn cart(state: &FakeState) -> Cart {
            Cart::from_lines(state.lines.clone(), CurrencyCode::USD)
        }

        async fn delay(&self) {
            let latency = self.state.lock().unwrap().latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
        }
    }

    impl CartBackend for FakeBackend {
        async fn fetch(&self) -> Result<Cart, ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Fetch);
            Ok(Self::cart(&state))
        }

        async fn add(&self, line: &NewCartLine) -> Result<Cart, ClientError> {
            self.delay().await;
            let mut state = self.state.lock().unwrap();
            state
                .calls
                .push(Call::Add(line.product_id.clone(), line.quantity));
            let id = LineId::new(format!("srv-{}", line.product_id));
            if let Some(existing) = state.lines.iter_mut().find(|l| l.id == id) {
                *existing = existing.with_quantity(existing.quantity + line.quantity);
            } else {
                state.lines.push(server_line(id.as_str(), line.quantity));
            }
            Ok(Self::cart(&state))
        }

        async fn update_quantity(&self, line: &LineId, quantity: u32) -> Result<Cart, ClientError> {
            self.delay().await;
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Update(line.clone(), quantity));
            if let Some(available) = state.conflict.take() {
                return Err(ClientError::StockConflict(StockConflict::new(available)));
            }
            let quantity = state.max_quantity.map_or(quantity, |max| quantity.min(max));
            if let Some(existing) = state.lines.iter_mut().find(|l| &l.id == line) {
                *existing = existing.with_quantity(quantity);
            }
            Ok(Self::cart(&state))
        }

        async fn remove(&self, line: &LineId) -> Result<Cart, ClientError> {
            self.delay().await;
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Remove(line.clone()));
            state.lines.retain(|l| &l.id != line);
            Ok(Self::cart(&state))
        }
    }

    fn price() -> Money {
        Money::new(Decimal::new(400, 2), CurrencyCode::USD)
    }

    fn server_line(id: &str, quantity: u32) -> CartLine {
        CartLine {
            id: LineId::new(id),
            product_id: ProductId::new(format!("p-{id}")),
            variation_id: None,
            sku: None,
            name: format!("Item {id}"),
            quantity,
            unit_price: price(),
            line_total: price().times(quantity),
            image: None,
        }
    }

    fn guest_line(product: &str, quantity: u32) -> NewCartLine {
        NewCartLine {
            product_id: ProductId::new(product),
            variation_id: None,
            quantity,
            name: format!("Product {product}"),
            sku: None,
            unit_price: Some(price()),
            image: None,
        }
    }

    async fn signed_in(fake: &Arc<FakeBackend>) -> CartSync<Arc<FakeBackend>> {
        let sync = CartSync::new(
            Arc::clone(fake),
            GuestCart::load(LocalStore::memory()),
            DEBOUNCE,
        );
        sync.sign_in().await.unwrap();
        sync
    }

    fn l1() -> LineId {
        LineId::new("l1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_send_one_update_with_last_value() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1)]);
        let sync = signed_in(&fake).await;

        for quantity in [2, 3, 4, 5] {
            sync.set_quantity(&l1(), quantity).await.unwrap();
            assert_eq!(sync.view().quantity(&l1()), Some(quantity));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(
            sync.view().line(&l1()).unwrap().status,
            LineStatus::PendingEdit
        );
        assert!(fake.mutation_calls().is_empty());

        sync.settled().await;
        assert_eq!(fake.mutation_calls(), vec![Call::Update(l1(), 5)]);
        assert_eq!(sync.view().quantity(&l1()), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_update_restores_snapshot() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1)]);
        let sync = signed_in(&fake).await;
        fake.state.lock().unwrap().conflict = Some(2);

        sync.set_quantity(&l1(), 6).await.unwrap();
        sync.set_quantity(&l1(), 9).await.unwrap();
        assert_eq!(sync.view().quantity(&l1()), Some(9));

        sync.settled().await;
        let view = sync.view();
        let line = view.line(&l1()).unwrap();
        assert_eq!(line.line.quantity, 1);
        assert_eq!(line.line.line_total, price().times(1));
        assert_eq!(line.error, Some(LineError::OnlyAvailable(2)));
        assert_eq!(line.status, LineStatus::Idle);

        sync.clear_error(&l1()).await;
        assert_eq!(sync.view().line(&l1()).unwrap().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_stock_error() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1)]);
        let sync = signed_in(&fake).await;
        fake.state.lock().unwrap().conflict = Some(0);

        sync.set_quantity(&l1(), 3).await.unwrap();
        sync.settled().await;
        assert_eq!(
            sync.view().line(&l1()).unwrap().error,
            Some(LineError::OutOfStock)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_adopts_server_lines() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1), server_line("l2", 2)]);
        let sync = signed_in(&fake).await;
        {
            let mut state = fake.state.lock().unwrap();
            state.max_quantity = Some(10);
            // Changed elsewhere (another tab, a sales rep)
            state.lines.push(server_line("l3", 1));
        }

        sync.set_quantity(&l1(), 25).await.unwrap();
        sync.settled().await;

        let view = sync.view();
        let shown: Vec<CartLine> = view.lines.iter().map(|v| v.line.clone()).collect();
        assert_eq!(shown, fake.state.lock().unwrap().lines);
        assert_eq!(view.quantity(&l1()), Some(10));
        assert_eq!(view.item_count, 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_removes_after_confirmation() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 2), server_line("l2", 1)]);
        let sync = signed_in(&fake).await;

        sync.remove(&l1()).await.unwrap();
        let view = sync.view();
        let pending = view.line(&l1()).unwrap();
        assert_eq!(pending.line.quantity, 0);
        assert_eq!(pending.status, LineStatus::PendingEdit);

        sync.settled().await;
        assert!(sync.view().line(&l1()).is_none());
        assert_eq!(fake.mutation_calls(), vec![Call::Remove(l1())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_edits_never_hit_network() {
        let fake = Arc::new(FakeBackend::default());
        let sync = CartSync::new(
            Arc::clone(&fake),
            GuestCart::load(LocalStore::memory()),
            DEBOUNCE,
        );

        let id = sync.add(guest_line("p1", 2)).await.unwrap();
        sync.set_quantity(&id, 5).await.unwrap();
        assert_eq!(sync.view().quantity(&id), Some(5));
        sync.add(guest_line("p2", 1)).await.unwrap();
        sync.remove(&id).await.unwrap();
        sync.flush().await;
        tokio::time::sleep(DEBOUNCE * 5).await;

        let view = sync.view();
        assert_eq!(view.mode, CartMode::Guest);
        assert_eq!(view.lines.len(), 1);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_flight_is_queued() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1)]);
        let sync = signed_in(&fake).await;
        fake.state.lock().unwrap().latency = Duration::from_millis(100);

        sync.set_quantity(&l1(), 2).await.unwrap();
        // Timer fires at 200ms, the reply lands at 300ms
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(sync.view().line(&l1()).unwrap().status, LineStatus::Updating);

        sync.set_quantity(&l1(), 7).await.unwrap();
        assert_eq!(sync.view().quantity(&l1()), Some(2));

        sync.settled().await;
        assert_eq!(
            fake.mutation_calls(),
            vec![Call::Update(l1(), 2), Call::Update(l1(), 7)]
        );
        assert_eq!(sync.view().quantity(&l1()), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_edit_survives_other_line_reply() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1), server_line("l2", 1)]);
        let sync = signed_in(&fake).await;

        sync.set_quantity(&l1(), 4).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        sync.set_quantity(&LineId::new("l2"), 3).await.unwrap();
        // l1 is sent at 200ms; l2 still pending
        tokio::time::sleep(Duration::from_millis(100)).await;
        let view = sync.view();
        assert_eq!(view.quantity(&LineId::new("l2")), Some(3));
        assert_eq!(
            view.line(&LineId::new("l2")).unwrap().status,
            LineStatus::PendingEdit
        );

        sync.settled().await;
        assert_eq!(
            fake.mutation_calls(),
            vec![Call::Update(l1(), 4), Call::Update(LineId::new("l2"), 3)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_removed_elsewhere_is_not_rolled_back() {
        let l2 = LineId::new("l2");
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1), server_line("l2", 1)]);
        let sync = signed_in(&fake).await;
        fake.state.lock().unwrap().latency = Duration::from_millis(100);

        // l2 is sent at 200ms (reply at 300ms), l1 at 250ms (reply at 350ms)
        sync.remove(&l2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        sync.set_quantity(&l1(), 5).await.unwrap();
        tokio::time::sleep(Duration::from_millis(210)).await;
        {
            // l1 disappears server-side and its own update will be refused
            let mut state = fake.state.lock().unwrap();
            state.lines.retain(|line| line.id != l1());
            state.conflict = Some(2);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        let view = sync.view();
        assert!(view.lines.is_empty());
        assert!(view.is_busy());

        sync.settled().await;
        let view = sync.view();
        assert!(view.lines.is_empty());
        assert!(!view.is_busy());
        assert!(fake.state.lock().unwrap().lines.is_empty());
        assert_eq!(
            fake.mutation_calls(),
            vec![Call::Remove(l2), Call::Update(l1(), 5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_sends_immediately() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1)]);
        let sync = signed_in(&fake).await;

        sync.set_quantity(&l1(), 8).await.unwrap();
        sync.flush().await;
        assert_eq!(fake.mutation_calls(), vec![Call::Update(l1(), 8)]);

        // The aborted timer never sends a second update
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(fake.mutation_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_merges_guest_lines() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1)]);
        let store = LocalStore::memory();
        let sync = CartSync::new(Arc::clone(&fake), GuestCart::load(store.clone()), DEBOUNCE);
        sync.add(guest_line("p9", 3)).await.unwrap();

        let outcome = sync.sign_in().await.unwrap();
        assert_eq!(outcome.merged, 1);
        assert!(outcome.rejected.is_empty());
        assert!(fake.calls().contains(&Call::Add(ProductId::new("p9"), 3)));

        let view = sync.view();
        assert_eq!(view.mode, CartMode::Authenticated);
        assert_eq!(view.lines.len(), 2);
        assert!(GuestCart::load(store).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_session_falls_back_to_guest() {
        let fake = FakeBackend::with_lines(vec![server_line("l1", 1)]);
        let sync = CartSync::new(
            Arc::clone(&fake),
            GuestCart::load(LocalStore::memory()),
            DEBOUNCE,
        );
        let events = crate::session::channel();
        let _task = sync.follow_session(events.subscribe());
        let mut views = sync.subscribe();

        events
            .send(SessionEvent::LoggedIn(Customer {
                id: "c1".into(),
                email: Email::parse("buyer@acme.com").unwrap(),
                name: "Buyer".to_string(),
                company: None,
                default_location_id: None,
            }))
            .unwrap();
        views
            .wait_for(|v| v.mode == CartMode::Authenticated && !v.lines.is_empty())
            .await
            .unwrap();

        // A pending edit is dropped along with the server cart
        sync.set_quantity(&l1(), 5).await.unwrap();
        events
            .send(SessionEvent::LoggedOut(LogoutReason::Unauthorized))
            .unwrap();
        views.wait_for(|v| v.mode == CartMode::Guest).await.unwrap();

        tokio::time::sleep(DEBOUNCE * 2).await;
        assert!(sync.view().lines.is_empty());
        assert!(fake.mutation_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_line_rejected() {
        let fake = FakeBackend::with_lines(vec![]);
        let sync = signed_in(&fake).await;
        assert!(matches!(
            sync.set_quantity(&l1(), 1).await,
            Err(CartError::UnknownLine(_))
        ));
    }
}
