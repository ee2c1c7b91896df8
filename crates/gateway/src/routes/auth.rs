//! Authentication route handlers.
//!
//! Login exchanges the customer's credentials for an ERP token (password
//! grant) and keeps token and customer in the session.

use axum::{Json, extract::State, http::StatusCode};
use depot_core::{Customer, Email};
use secrecy::SecretString;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::erp::{Credential, ErpError};
use crate::error::{AppError, Result};
use crate::middleware::{end_customer_session, start_customer_session};
use crate::state::AppState;

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Sign in with email and password.
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Customer>> {
    let email = Email::parse(&body.email)
        .map_err(|e| AppError::BadRequest(format!("Invalid email address: {e}")))?;
    let password = SecretString::from(body.password);

    let mut token = match state.erp().password_login(email.as_str(), &password).await {
        Ok(token) => token,
        Err(ErpError::InvalidCredentials) => {
            warn!(email_domain = %email.domain(), "Login rejected");
            return Err(ErpError::InvalidCredentials.into());
        }
        Err(e) => return Err(e.into()),
    };

    let customer = state
        .erp()
        .customer(Credential::Customer(&mut token))
        .await?;

    start_customer_session(&session, &customer, &token).await?;
    info!(customer_id = %customer.id, "Customer signed in");

    Ok(Json(customer))
}

/// Sign out. Succeeds for guests too.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    end_customer_session(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}
