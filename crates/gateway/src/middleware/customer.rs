//! Customer session extractors.
//!
//! The session holds the signed-in [`Customer`] and their [`ErpToken`].
//! Handlers pass the token to the ERP client through
//! [`CustomerSession::credential`] and hand the result to
//! [`CustomerSession::settle`], which writes back a refreshed token and ends
//! the session when the ERP no longer accepts it.

use axum::{extract::FromRequestParts, http::request::Parts};
use depot_core::Customer;
use tower_sessions::Session;
use tracing::{debug, info};

use crate::erp::{Credential, ErpError, ErpToken};
use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::models::session_keys;

/// A signed-in customer with their ERP token.
pub struct CustomerSession {
    session: Session,
    pub customer: Customer,
    token: ErpToken,
    loaded: ErpToken,
}

impl CustomerSession {
    async fn load(session: &Session) -> Result<Option<Self>, AppError> {
        let customer: Option<Customer> = session.get(session_keys::CUSTOMER).await?;
        let token: Option<ErpToken> = session.get(session_keys::ERP_TOKEN).await?;

        Ok(match (customer, token) {
            (Some(customer), Some(token)) => Some(Self {
                session: session.clone(),
                customer,
                loaded: token.clone(),
                token,
            }),
            _ => None,
        })
    }

    /// Credential for ERP calls made on behalf of this customer.
    pub fn credential(&mut self) -> Credential<'_> {
        Credential::Customer(&mut self.token)
    }

    /// Persist a refreshed token and convert the ERP result.
    ///
    /// A final `Unauthorized` from the ERP ends the session, so the client
    /// sees a 401 and falls back to guest mode.
    ///
    /// # Errors
    ///
    /// Returns the ERP error as an `AppError`, or a session error if the
    /// session cannot be updated.
    pub async fn settle<T>(&self, result: Result<T, ErpError>) -> Result<T, AppError> {
        if matches!(result, Err(ErpError::Unauthorized)) {
            info!(customer_id = %self.customer.id, "ERP rejected customer token, ending session");
            end_customer_session(&self.session).await?;
            return Err(ErpError::Unauthorized.into());
        }

        if self.token != self.loaded {
            debug!(customer_id = %self.customer.id, "Storing refreshed ERP token");
            self.session
                .insert(session_keys::ERP_TOKEN, &self.token)
                .await?;
        }

        Ok(result?)
    }
}

fn session_of(parts: &Parts) -> Result<&Session, AppError> {
    parts
        .extensions
        .get::<Session>()
        .ok_or_else(|| AppError::Internal("session layer missing".to_string()))
}

/// Extractor that requires a signed-in customer (401 otherwise).
pub struct RequireCustomer(pub CustomerSession);

impl<S> FromRequestParts<S> for RequireCustomer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = session_of(parts)?;
        let auth = CustomerSession::load(session)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))?;

        set_sentry_user(&auth.customer.id, Some(auth.customer.email.as_str()));
        Ok(Self(auth))
    }
}

/// Extractor that optionally gets the signed-in customer.
///
/// Catalog endpoints use the customer's token when present (for
/// customer-specific pricing) and the service token otherwise.
pub struct OptionalCustomer(pub Option<CustomerSession>);

impl OptionalCustomer {
    /// The customer's credential, or the service credential for guests.
    pub fn credential(&mut self) -> Credential<'_> {
        self.0
            .as_mut()
            .map_or(Credential::Service, CustomerSession::credential)
    }

    /// See [`CustomerSession::settle`].
    ///
    /// # Errors
    ///
    /// Returns the ERP error as an `AppError`.
    pub async fn settle<T>(&self, result: Result<T, ErpError>) -> Result<T, AppError> {
        match &self.0 {
            Some(auth) => auth.settle(result).await,
            None => Ok(result?),
        }
    }
}

impl<S> FromRequestParts<S> for OptionalCustomer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = match parts.extensions.get::<Session>() {
            Some(session) => CustomerSession::load(session).await?,
            None => None,
        };

        if let Some(auth) = &auth {
            set_sentry_user(&auth.customer.id, Some(auth.customer.email.as_str()));
        }
        Ok(Self(auth))
    }
}

/// Store a freshly signed-in customer in the session.
///
/// The session ID is cycled to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn start_customer_session(
    session: &Session,
    customer: &Customer,
    token: &ErpToken,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CUSTOMER, customer).await?;
    session.insert(session_keys::ERP_TOKEN, token).await?;
    set_sentry_user(&customer.id, Some(customer.email.as_str()));
    Ok(())
}

/// Drop the customer from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn end_customer_session(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await?;
    clear_sentry_user();
    Ok(())
}
