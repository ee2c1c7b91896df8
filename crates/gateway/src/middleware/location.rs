//! Selected-location extractor.
//!
//! Clients send the shopper's location in `x-location-id`; handlers of
//! location-scoped endpoints forward it to the ERP as `location_id`.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use depot_core::LocationId;

/// Header carrying the selected location.
pub const LOCATION_HEADER: &str = "x-location-id";

/// The location selected by the client, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedLocation(pub Option<LocationId>);

impl SelectedLocation {
    #[must_use]
    pub const fn as_ref(&self) -> Option<&LocationId> {
        self.0.as_ref()
    }
}

impl<S> FromRequestParts<S> for SelectedLocation
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let location = parts
            .headers
            .get(LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(LocationId::from);

        Ok(Self(location))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(header: Option<&str>) -> SelectedLocation {
        let mut builder = Request::builder().uri("/api/products");
        if let Some(value) = header {
            builder = builder.header(LOCATION_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        SelectedLocation::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reads_header() {
        assert_eq!(extract(Some(" 42 ")).await.as_ref().map(LocationId::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_missing_or_blank_is_none() {
        assert_eq!(extract(None).await, SelectedLocation(None));
        assert_eq!(extract(Some("  ")).await, SelectedLocation(None));
    }
}
