//! Geocoding client: Nominatim primary, Google fallback
//!
//! Results are cached permanently in the `geocode_cache` table, keyed by
//! the verbatim address string, so each address costs at most one provider
//! round-trip over the lifetime of the database.
//!
//! A provider outage is surfaced as [`GeocodeError`], never as "address not
//! found": not-found is only reported when a healthy provider answered and
//! found nothing.

use omival_common::db::GeocodeCacheEntry;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";
const GOOGLE_BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const USER_AGENT: &str = "omival/0.1.0 (https://github.com/omival/omival)";
// Nominatim usage policy: at most 1 request per second
const RATE_LIMIT_MS: u64 = 1000;

/// Geocoding errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider error {0}: {1}")]
    Provider(u16, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("geocode cache error: {0}")]
    Cache(#[from] sqlx::Error),
}

/// A geocoded address
#[derive(Debug, Clone)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    /// Which provider produced the fix ("nominatim", "google", "cache")
    pub source: String,
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    geometry: GoogleGeometry,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: GoogleLocation,
}

#[derive(Debug, Deserialize)]
struct GoogleLocation {
    lat: f64,
    lng: f64,
}

/// Italian-scoped geocoder with permanent cache
pub struct Geocoder {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    google_api_key: Option<String>,
}

impl Geocoder {
    pub fn new(timeout_secs: u64, google_api_key: Option<String>) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RATE_LIMIT_MS),
            google_api_key,
        })
    }

    /// Geocode an address, checking the cache first.
    ///
    /// `Ok(None)` means a healthy provider found nothing for this address.
    pub async fn geocode(
        &self,
        address: &str,
        db: &SqlitePool,
    ) -> Result<Option<GeoPoint>, GeocodeError> {
        if let Some(cached) = self.cached(address, db).await? {
            return Ok(Some(cached));
        }

        match self.try_nominatim(address).await {
            Ok(Some(point)) => {
                self.store(address, &point, db).await;
                Ok(Some(point))
            }
            Ok(None) => {
                // Primary answered authoritatively; the fallback only adds
                // coverage for addresses Nominatim does not know.
                match &self.google_api_key {
                    Some(key) => match self.try_google(address, key).await {
                        Ok(Some(point)) => {
                            self.store(address, &point, db).await;
                            Ok(Some(point))
                        }
                        Ok(None) => Ok(None),
                        Err(e) => {
                            warn!("Google fallback failed for '{}': {}", address, e);
                            Ok(None)
                        }
                    },
                    None => Ok(None),
                }
            }
            Err(primary) => {
                warn!("Nominatim failed for '{}': {}", address, primary);
                match &self.google_api_key {
                    Some(key) => match self.try_google(address, key).await {
                        Ok(Some(point)) => {
                            self.store(address, &point, db).await;
                            Ok(Some(point))
                        }
                        // A healthy fallback answered: its not-found stands.
                        Ok(None) => Ok(None),
                        Err(fallback) => {
                            warn!("Google fallback failed for '{}': {}", address, fallback);
                            Err(primary)
                        }
                    },
                    None => Err(primary),
                }
            }
        }
    }

    async fn cached(
        &self,
        address: &str,
        db: &SqlitePool,
    ) -> Result<Option<GeoPoint>, GeocodeError> {
        let entry = sqlx::query_as::<_, GeocodeCacheEntry>(
            "SELECT address, lat, lng, source FROM geocode_cache WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(db)
        .await?;

        Ok(entry.map(|e| GeoPoint {
            lat: e.lat,
            lng: e.lng,
            source: e.source,
        }))
    }

    /// Cache write failures must not fail the request
    async fn store(&self, address: &str, point: &GeoPoint, db: &SqlitePool) {
        let result = sqlx::query(
            "INSERT INTO geocode_cache (address, lat, lng, source) VALUES (?, ?, ?, ?) \
             ON CONFLICT (address) DO NOTHING",
        )
        .bind(address)
        .bind(point.lat)
        .bind(point.lng)
        .bind(&point.source)
        .execute(db)
        .await;

        if let Err(e) = result {
            warn!("Failed to cache geocode result for '{}': {}", address, e);
        }
    }

    async fn try_nominatim(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        self.rate_limiter.wait().await;

        let response = self
            .http_client
            .get(NOMINATIM_BASE_URL)
            .query(&[
                ("q", address),
                ("format", "json"),
                ("limit", "1"),
                ("countrycodes", "it"),
            ])
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Provider(status.as_u16(), error_text));
        }

        let hits: Vec<NominatimHit> = response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))?;

        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let lat = hit
            .lat
            .parse::<f64>()
            .map_err(|e| GeocodeError::Parse(format!("bad latitude '{}': {}", hit.lat, e)))?;
        let lng = hit
            .lon
            .parse::<f64>()
            .map_err(|e| GeocodeError::Parse(format!("bad longitude '{}': {}", hit.lon, e)))?;

        info!("Nominatim geocoded '{}' -> ({}, {})", address, lat, lng);
        Ok(Some(GeoPoint {
            lat,
            lng,
            source: "nominatim".to_string(),
        }))
    }

    async fn try_google(
        &self,
        address: &str,
        api_key: &str,
    ) -> Result<Option<GeoPoint>, GeocodeError> {
        let response = self
            .http_client
            .get(GOOGLE_BASE_URL)
            .query(&[("address", address), ("region", "it"), ("key", api_key)])
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Provider(status.as_u16(), error_text));
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))?;

        match body.status.as_str() {
            "OK" => {
                let Some(result) = body.results.into_iter().next() else {
                    return Ok(None);
                };
                let location = result.geometry.location;
                info!(
                    "Google geocoded '{}' -> ({}, {})",
                    address, location.lat, location.lng
                );
                Ok(Some(GeoPoint {
                    lat: location.lat,
                    lng: location.lng,
                    source: "google".to_string(),
                }))
            }
            "ZERO_RESULTS" => Ok(None),
            other => Err(GeocodeError::Provider(200, format!("status {other}"))),
        }
    }
}
