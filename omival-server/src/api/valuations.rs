//! Valuation endpoints

use crate::error::Result;
use crate::services::coefficients::coefficient_options;
use crate::services::valuation::{
    enhanced_valuate_address, valuate_address, EnhancedOutcome, ValuationOutcome,
};
use crate::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

fn default_property_type() -> i64 {
    20 // Abitazioni civili
}

#[derive(Debug, Deserialize)]
pub struct ValuateQuery {
    /// Italian address to valuate
    pub address: String,
    #[serde(default = "default_property_type")]
    pub property_type: i64,
    /// Surface area in m² for the total estimate
    pub surface_m2: Option<f64>,
    /// Semester, e.g. "2024_S2"; latest when omitted
    pub semester: Option<String>,
}

/// GET /api/valuate: geocode an address and return OMI zone + price data.
pub async fn valuate(
    State(state): State<AppState>,
    Query(query): Query<ValuateQuery>,
) -> Result<Json<ValuationOutcome>> {
    let outcome = valuate_address(
        &state,
        &query.address,
        query.property_type,
        query.surface_m2,
        query.semester.as_deref(),
    )
    .await?;
    Ok(Json(outcome))
}

/// User-provided property characteristics for coefficient adjustment.
///
/// Defaults describe the neutral property: every default option carries a
/// zero percentage except the conservation state, which selects the base
/// band rather than adjusting it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PropertyDetails {
    pub conservation_state: String, // "OTTIMO" | "NORMALE" | "SCADENTE"
    pub renovation: String,
    pub floor: String,
    pub exposure: String,
    pub noise: String,
    pub common_areas: String,
    pub building_facade: String,
    pub energy_class: String,
    pub elevator: String,
}

impl Default for PropertyDetails {
    fn default() -> Self {
        Self {
            conservation_state: "NORMALE".to_string(),
            renovation: "none".to_string(),
            floor: "second".to_string(),
            exposure: "east_west".to_string(),
            noise: "normal".to_string(),
            common_areas: "good".to_string(),
            building_facade: "good_condition".to_string(),
            energy_class: "E".to_string(),
            elevator: "yes".to_string(),
        }
    }
}

impl PropertyDetails {
    pub fn to_factor_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("conservation_state".to_string(), self.conservation_state.clone()),
            ("renovation".to_string(), self.renovation.clone()),
            ("floor".to_string(), self.floor.clone()),
            ("exposure".to_string(), self.exposure.clone()),
            ("noise".to_string(), self.noise.clone()),
            ("common_areas".to_string(), self.common_areas.clone()),
            ("building_facade".to_string(), self.building_facade.clone()),
            ("energy_class".to_string(), self.energy_class.clone()),
            ("elevator".to_string(), self.elevator.clone()),
        ])
    }
}

#[derive(Debug, Deserialize)]
pub struct EnhancedValuationRequest {
    pub address: String,
    pub surface_m2: f64,
    #[serde(default = "default_property_type")]
    pub property_type: i64,
    pub semester: Option<String>,
    #[serde(default)]
    pub details: PropertyDetails,
}

/// POST /api/valuate/enhanced: valuation with correction coefficients.
///
/// Applies property-specific adjustments (floor, renovation, exposure,
/// noise, ...) on top of the OMI band for the selected conservation state.
pub async fn enhanced_valuate(
    State(state): State<AppState>,
    Json(request): Json<EnhancedValuationRequest>,
) -> Result<Json<EnhancedOutcome>> {
    let outcome = enhanced_valuate_address(
        &state,
        &request.address,
        request.property_type,
        request.surface_m2,
        request.semester.as_deref(),
        &request.details.to_factor_map(),
    )
    .await?;
    Ok(Json(outcome))
}

/// GET /api/coefficients: all correction factors and options.
///
/// Used by the frontend wizard to build the property details form.
pub async fn list_coefficients(State(state): State<AppState>) -> Json<Value> {
    let mut factors = serde_json::Map::new();
    for (key, options) in coefficient_options(&state.coefficients) {
        factors.insert(key, json!(options));
    }
    Json(json!({ "factors": factors }))
}
