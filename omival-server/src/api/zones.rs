//! Zone lookup and map endpoints

use crate::api::resolve_semester;
use crate::error::{Error, Result};
use crate::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ByCoordinatesQuery {
    pub lat: f64,
    pub lng: f64,
    pub semester: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ZoneByCoordinatesResponse {
    pub link_zona: String,
    pub zone_code: String,
    pub fascia: Option<String>,
    pub municipality: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    pub semester: String,
}

/// GET /api/zones/by-coordinates: OMI zone for a lat/lng point.
pub async fn zone_by_coordinates(
    State(state): State<AppState>,
    Query(query): Query<ByCoordinatesQuery>,
) -> Result<Json<ZoneByCoordinatesResponse>> {
    let semester = resolve_semester(&state, query.semester).await?;
    let index = state.zones.index_for(&semester).await?;

    let zone = index
        .locate(query.lat, query.lng)
        .ok_or(Error::ZoneNotFound {
            lat: query.lat,
            lng: query.lng,
        })?;

    Ok(Json(ZoneByCoordinatesResponse {
        link_zona: zone.link_zona,
        zone_code: zone.zone_code,
        fascia: zone.fascia,
        municipality: zone.municipality_name,
        description: zone.zone_description,
        distance_m: zone.distance_m,
        semester,
    }))
}

fn default_map_property_type() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct GeojsonQuery {
    /// Bounding box: "min_lng,min_lat,max_lng,max_lat"
    pub bbox: Option<String>,
    pub semester: Option<String>,
    /// Property type whose prevalent band decorates each feature
    #[serde(default = "default_map_property_type")]
    pub property_type: i64,
}

/// GET /api/zones/geojson: zone polygons as a GeoJSON FeatureCollection
/// for map display, each feature carrying its prevalent price band.
pub async fn zones_geojson(
    State(state): State<AppState>,
    Query(query): Query<GeojsonQuery>,
) -> Result<Json<Value>> {
    let envelope = query.bbox.as_deref().map(parse_bbox).transpose()?;
    let semester = resolve_semester(&state, query.semester).await?;
    let index = state.zones.index_for(&semester).await?;
    let bands =
        crate::db::prevalent_price_bands(&state.db, &semester, query.property_type).await?;

    let mut features = Vec::new();
    for zone in index.zones_in_envelope(envelope) {
        let geometry: Value = match serde_json::from_str(&zone.raw_geometry) {
            Ok(geometry) => geometry,
            Err(e) => {
                warn!(link_zona = %zone.link_zona, "Unserializable zone geometry: {e}");
                continue;
            }
        };
        let (price_min, price_max) = bands
            .get(&zone.link_zona)
            .copied()
            .unwrap_or((None, None));
        features.push(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": {
                "link_zona": zone.link_zona,
                "zone_code": zone.zone_code,
                "fascia": zone.fascia,
                "municipality": zone.municipality_name,
                "description": zone.zone_description,
                "price_min": price_min,
                "price_max": price_max,
            },
        }));
    }

    Ok(Json(json!({
        "type": "FeatureCollection",
        "features": features,
    })))
}

fn parse_bbox(raw: &str) -> Result<[f64; 4]> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::InvalidInput(format!("malformed bbox '{raw}': {e}")))?;
    let &[min_lng, min_lat, max_lng, max_lat] = parts.as_slice() else {
        return Err(Error::InvalidInput(format!(
            "bbox must have 4 comma-separated values, got {}",
            parts.len()
        )));
    };
    Ok([min_lng, min_lat, max_lng, max_lat])
}

#[derive(Debug, Deserialize)]
pub struct ZoneQuotationsQuery {
    pub link_zona: String,
    pub semester: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ZoneQuotationItem {
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

/// GET /api/quotations: all quotations for a zone, every property type.
pub async fn zone_quotations(
    State(state): State<AppState>,
    Query(query): Query<ZoneQuotationsQuery>,
) -> Result<Json<Vec<ZoneQuotationItem>>> {
    let semester = resolve_semester(&state, query.semester).await?;
    let quotations =
        crate::db::quotations_for_zone(&state.db, &query.link_zona, &semester).await?;

    Ok(Json(
        quotations
            .into_iter()
            .map(|q| ZoneQuotationItem {
                property_type_code: q.property_type_code,
                property_type_desc: q.property_type_desc,
                conservation_state: q.conservation_state,
                is_prevalent: q.is_prevalent,
                price_min: q.price_min,
                price_max: q.price_max,
                surface_type_sale: q.surface_type_sale,
                rent_min: q.rent_min,
                rent_max: q.rent_max,
                surface_type_rent: q.surface_type_rent,
            })
            .collect(),
    ))
}
