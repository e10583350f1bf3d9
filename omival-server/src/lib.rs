//! omival-server library: OMI-based Italian property valuation service
//!
//! Resolves addresses to OMI price-band zones (point-in-polygon with a
//! bounded nearest-neighbor fallback) and turns zone-level EUR/m² bands
//! into property-specific estimates.

use axum::http::HeaderValue;
use axum::Router;
use omival_common::Settings;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod api;
pub mod db;
pub mod error;
pub mod services;

pub use error::{Error, Result};

use services::coefficients::CoefficientTable;
use services::geocoder::Geocoder;
use services::zone_index::SpatialCatalog;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Geocoding client with permanent cache
    pub geocoder: Arc<Geocoder>,
    /// Per-semester zone indexes
    pub zones: Arc<SpatialCatalog>,
    /// Static correction table, built once at startup
    pub coefficients: Arc<CoefficientTable>,
    /// Resolved service configuration
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: Settings) -> Result<Self> {
        let geocoder = Geocoder::new(
            settings.geocode_timeout_secs,
            settings.google_geocoding_api_key.clone(),
        )
        .map_err(|e| Error::Internal(format!("failed to build geocoder: {e}")))?;

        Ok(Self {
            zones: Arc::new(SpatialCatalog::new(db.clone())),
            db,
            geocoder: Arc::new(geocoder),
            coefficients: Arc::new(CoefficientTable::standard()),
            settings: Arc::new(settings),
        })
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let cors = cors_layer(&state.settings);

    Router::new()
        .route("/api/health", get(api::health::health))
        .route("/api/valuate", get(api::valuations::valuate))
        .route(
            "/api/valuate/enhanced",
            post(api::valuations::enhanced_valuate),
        )
        .route("/api/coefficients", get(api::valuations::list_coefficients))
        .route("/api/semesters", get(api::semesters::list_semesters))
        .route(
            "/api/zones/by-coordinates",
            get(api::zones::zone_by_coordinates),
        )
        .route("/api/zones/geojson", get(api::zones::zones_geojson))
        .route("/api/quotations", get(api::zones::zone_quotations))
        .route(
            "/api/transactions",
            post(api::transactions::create_transaction)
                .get(api::transactions::list_transactions),
        )
        .route(
            "/api/transactions/:id",
            put(api::transactions::update_transaction)
                .delete(api::transactions::delete_transaction),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
