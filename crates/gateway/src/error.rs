//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Error bodies are JSON: `{"error": "<code>", "message": "..."}`. Stock
//! conflicts additionally carry `available`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use depot_core::StockConflict;
use serde::Serialize;
use thiserror::Error;

use crate::erp::ErpError;

/// Application-level error type for the gateway.
#[derive(Debug, Error)]
pub enum AppError {
    /// ERP connector call failed.
    #[error("ERP error: {0}")]
    Erp(#[from] ErpError),

    /// Session store operation failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Customer is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<u32>,
}

impl AppError {
    /// Whether this error is the server's fault (reported to Sentry).
    const fn is_server_error(&self) -> bool {
        match self {
            Self::Session(_) | Self::Internal(_) => true,
            Self::Erp(err) => matches!(
                err,
                ErpError::Http(_)
                    | ErpError::Parse(_)
                    | ErpError::Url(_)
                    | ErpError::OAuth(_)
                    | ErpError::Upstream { .. }
            ),
            Self::NotFound(_) | Self::Unauthorized(_) | Self::BadRequest(_) => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Erp(err) => match err {
                ErpError::Unauthorized | ErpError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                ErpError::NotFound(_) => StatusCode::NOT_FOUND,
                ErpError::StockConflict(_) => StatusCode::CONFLICT,
                ErpError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ErpError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> ErrorBody<'static> {
        // Don't expose internal error details to clients
        let (error, message) = match self {
            Self::Session(_) | Self::Internal(_) => ("internal", "Internal server error".to_string()),
            Self::Erp(err) => match err {
                ErpError::Unauthorized => ("unauthorized", "Please sign in again".to_string()),
                ErpError::InvalidCredentials => {
                    ("invalid_credentials", "Invalid email or password".to_string())
                }
                ErpError::NotFound(msg) => ("not_found", msg.clone()),
                ErpError::StockConflict(conflict) => {
                    return stock_conflict_body(conflict);
                }
                ErpError::Validation(msg) => ("validation", msg.clone()),
                ErpError::RateLimited(_) => {
                    ("rate_limited", "Too many requests, please slow down".to_string())
                }
                _ => ("upstream_error", "External service error".to_string()),
            },
            Self::NotFound(msg) => ("not_found", msg.clone()),
            Self::Unauthorized(msg) => ("unauthorized", msg.clone()),
            Self::BadRequest(msg) => ("bad_request", msg.clone()),
        };

        ErrorBody {
            error,
            message,
            available: None,
        }
    }
}

fn stock_conflict_body(conflict: &StockConflict) -> ErrorBody<'static> {
    let message = if conflict.message.is_empty() || conflict.message == StockConflict::CODE {
        StockConflict::new(conflict.available).message
    } else {
        conflict.message.clone()
    };

    ErrorBody {
        error: StockConflict::CODE,
        message,
        available: Some(conflict.available),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), Json(self.body())).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the signed-in customer.
///
/// Call this after successful authentication to associate errors with customers.
pub fn set_sentry_user(customer_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(customer_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the customer.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for customer actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Updated line quantity", Some(&[("line_id", "l-1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
