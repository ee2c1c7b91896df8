//! Client error type.

use depot_core::StockConflict;
use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by the gateway client.
///
/// Three categories matter to the UI: [`ClientError::Unauthorized`] (the
/// session is gone, a logout has been broadcast), [`ClientError::StockConflict`]
/// (show the available count inline) and everything else (generic failure).
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A path could not be turned into a URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The gateway rejected the session.
    #[error("Not signed in")]
    Unauthorized,

    /// The requested quantity exceeds available stock.
    #[error("{}", .0.message)]
    StockConflict(StockConflict),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("Request failed ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Local state could not be read or written.
    #[error("Local storage error: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Whether this error means the session is no longer valid.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// The stock conflict payload, if this is a stock conflict.
    #[must_use]
    pub const fn stock_conflict(&self) -> Option<&StockConflict> {
        match self {
            Self::StockConflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::StockConflict(StockConflict::new(3));
        assert_eq!(err.to_string(), "Only 3 available");

        let err = ClientError::Status {
            status: 502,
            message: "ERP unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed (502): ERP unavailable");
    }

    #[test]
    fn test_stock_conflict_accessor() {
        assert!(ClientError::Unauthorized.stock_conflict().is_none());
        assert!(ClientError::Unauthorized.is_unauthorized());
        assert_eq!(
            ClientError::StockConflict(StockConflict::new(0))
                .stock_conflict()
                .map(|c| c.available),
            Some(0)
        );
    }
}
