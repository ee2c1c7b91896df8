//! Session lifecycle events.
//!
//! The client broadcasts sign-in and sign-out so independent parts of a
//! front end (cart, account views, header) can react without polling. Any
//! 401 from the gateway produces a `LoggedOut(Unauthorized)` event.

use depot_core::Customer;
use tokio::sync::broadcast;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 16;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user signed out.
    UserRequested,
    /// The gateway answered 401 (session expired or revoked).
    Unauthorized,
}

/// A session lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(Customer),
    LoggedOut(LogoutReason),
}

/// Create the broadcast channel used for session events.
#[must_use]
pub fn channel() -> broadcast::Sender<SessionEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
