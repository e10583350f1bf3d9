//! Error types for omival-server
//!
//! One crate-wide enum covering the whole failure taxonomy. Every variant
//! carries a specific, distinguishable reason; the `IntoResponse` impl maps
//! the not-found family to 404, bad input to 400, dependency outages to 502,
//! and storage faults to 500. A geocoding outage is deliberately a distinct
//! variant from "address not found" so an outage is never reported as a
//! missing address.

use crate::services::geocoder::GeocodeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for omival-server
#[derive(Error, Debug)]
pub enum Error {
    /// No geocoding provider could resolve the address
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// The point falls in no zone of the semester, even within the fallback radius
    #[error("No OMI zone found for coordinates ({lat}, {lng})")]
    ZoneNotFound { lat: f64, lng: f64 },

    /// No OMI data loaded at all
    #[error("No OMI data available in the database")]
    NoData,

    /// No zone rows exist for the requested semester
    #[error("No OMI data available for semester {0}")]
    NoSemesterData(String),

    /// Enhanced valuation has no base band to adjust
    #[error("No quotation data for zone {link_zona} in semester {semester} for property type {property_type}")]
    NoQuotationData {
        link_zona: String,
        semester: String,
        property_type: i64,
    },

    /// No transaction with this id exists
    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    /// Invalid user input, rejected before any external call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Geocoding provider failure (network, timeout, bad response)
    #[error("Geocoding failed: {0}")]
    Geocode(#[from] GeocodeError),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using omival-server Error
pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::AddressNotFound(_)
            | Error::ZoneNotFound { .. }
            | Error::NoData
            | Error::NoSemesterData(_)
            | Error::NoQuotationData { .. }
            | Error::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Geocode(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_family_maps_to_404() {
        for err in [
            Error::AddressNotFound("via inesistente 1, Milano".into()),
            Error::ZoneNotFound { lat: 45.0, lng: 9.0 },
            Error::NoData,
            Error::NoSemesterData("2019_S1".into()),
            Error::NoQuotationData {
                link_zona: "IT00120-B1".into(),
                semester: "2024_S2".into(),
                property_type: 20,
            },
        ] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn invalid_input_maps_to_400() {
        let response = Error::InvalidInput("surface_m2 must be positive".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn geocode_outage_is_not_a_404() {
        let err = Error::Geocode(GeocodeError::Network("connection timed out".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn reasons_are_distinguishable() {
        let a = Error::NoSemesterData("2024_S2".into()).to_string();
        let b = Error::ZoneNotFound { lat: 45.1, lng: 9.2 }.to_string();
        assert_ne!(a, b);
        assert!(a.contains("2024_S2"));
        assert!(b.contains("45.1"));
    }
}
