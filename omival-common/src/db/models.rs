//! Database row models
//!
//! All OMI tables are bulk-loaded per semester and never mutated afterwards;
//! a new semester supersedes prior rows instead of replacing them. Only
//! `transactions` is user-maintained.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One OMI zone polygon for one data semester.
///
/// `(link_zona, semester)` is unique. `geometry` holds the zone polygon as
/// GeoJSON text (MultiPolygon or Polygon, WGS84 lon/lat) exactly as loaded
/// by the ETL importer; it is parsed once when the zone index is hydrated.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ZoneRecord {
    pub id: i64,
    pub link_zona: String,
    pub zone_code: String,
    pub fascia: Option<String>,
    pub municipality_istat: String,
    pub municipality_name: Option<String>,
    pub province_code: Option<String>,
    pub zone_description: Option<String>,
    pub semester: String,
    pub geometry: String,
}

/// One price/rent band for a (zone, semester, property type, conservation
/// state) tuple. `price_min > price_max` occurs in upstream data; rows are
/// kept as-is and the anomaly logged where observed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quotation {
    pub id: i64,
    pub link_zona: String,
    pub semester: String,
    pub property_type_code: i64,
    pub property_type_desc: Option<String>,
    pub conservation_state: Option<String>,
    pub is_prevalent: bool,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub surface_type_sale: Option<String>,
    pub rent_min: Option<f64>,
    pub rent_max: Option<f64>,
    pub surface_type_rent: Option<String>,
}

/// A real sale/rent record used as a valuation benchmark.
///
/// May reference a zone through `link_zona`, through the legacy `omi_zone`
/// code, or neither. Size is expressed in m² (`cadastral_mq`) or in vani
/// (`cadastral_vani`, room-equivalent units).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub transaction_date: Option<NaiveDate>,
    pub transaction_type: Option<String>,
    pub declared_price: Option<f64>,
    pub municipality: Option<String>,
    pub omi_zone: Option<String>,
    pub link_zona: Option<String>,
    pub cadastral_category: Option<String>,
    pub cadastral_vani: Option<f64>,
    pub cadastral_mq: Option<f64>,
    pub cadastral_mc: Option<f64>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// Permanent geocoding result, keyed by the verbatim address string.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GeocodeCacheEntry {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub source: String,
}
