//! Per-line sync status and the published cart view.

use core::fmt;

use depot_core::{CartLine, LineId, Money};

use crate::error::ClientError;

/// Whether the cart is backed by the server or by the local guest list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartMode {
    Guest,
    Authenticated,
}

/// Sync state of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineStatus {
    /// Displayed quantity matches the server.
    #[default]
    Idle,
    /// An edit is waiting out the debounce window.
    PendingEdit,
    /// An update request is in flight.
    Updating,
}

/// Why the last update of a line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// Nothing left at the selected location.
    OutOfStock,
    /// Fewer units available than requested.
    OnlyAvailable(u32),
    /// Network or server failure.
    Failed,
}

impl From<&ClientError> for LineError {
    fn from(err: &ClientError) -> Self {
        match err.stock_conflict() {
            Some(conflict) if conflict.available == 0 => Self::OutOfStock,
            Some(conflict) => Self::OnlyAvailable(conflict.available),
            None => Self::Failed,
        }
    }
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfStock => f.write_str("Out of stock"),
            Self::OnlyAvailable(n) => write!(f, "Only {n} available"),
            Self::Failed => f.write_str("Could not update quantity, please try again"),
        }
    }
}

/// A displayed line with its sync status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub line: CartLine,
    pub status: LineStatus,
    pub error: Option<LineError>,
}

/// Snapshot of the cart as it should be displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub mode: CartMode,
    pub lines: Vec<LineView>,
    pub subtotal: Money,
    pub item_count: u32,
    /// An edit is pending or in flight, possibly for a line no longer shown.
    pub syncing: bool,
}

impl CartView {
    /// Find a line by id.
    #[must_use]
    pub fn line(&self, id: &LineId) -> Option<&LineView> {
        self.lines.iter().find(|view| &view.line.id == id)
    }

    /// Whether any line has an edit pending or in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.syncing || self.lines.iter().any(|view| view.status != LineStatus::Idle)
    }

    /// The displayed quantity of a line, if present.
    #[must_use]
    pub fn quantity(&self, id: &LineId) -> Option<u32> {
        self.line(id).map(|view| view.line.quantity)
    }
}

#[cfg(test)]
mod tests {
    use depot_core::StockConflict;

    use super::*;

    #[test]
    fn test_line_error_from_client_error() {
        let out = ClientError::StockConflict(StockConflict::new(0));
        assert_eq!(LineError::from(&out), LineError::OutOfStock);

        let some = ClientError::StockConflict(StockConflict::new(3));
        assert_eq!(LineError::from(&some), LineError::OnlyAvailable(3));
        assert_eq!(LineError::OnlyAvailable(3).to_string(), "Only 3 available");

        let other = ClientError::Status {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(LineError::from(&other), LineError::Failed);
    }
}
