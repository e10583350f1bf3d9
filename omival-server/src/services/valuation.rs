//! Valuation pipelines: geocoding, zone resolution, and quotation retrieval
//!
//! Both pipelines share the same head: validate inputs, geocode the address,
//! resolve the data semester, locate the OMI zone. The basic pipeline then
//! degrades gracefully when quotation data is thin; the enhanced pipeline
//! requires a base band and layers the coefficient engine and benchmark
//! comparison on top.

use crate::error::{Error, Result};
use crate::services::benchmark::compare_with_benchmarks;
use crate::services::coefficients::{compute_adjusted_estimate, round2, AdjustedEstimate};
use crate::services::geocoder::GeoPoint;
use crate::services::zone_index::ResolvedZone;
use crate::AppState;
use omival_common::db::{Quotation, Transaction};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Comparables fetched per valuation
const COMPARABLE_LIMIT: i64 = 20;

/// OMI residential property-type codes accepted by the valuation endpoints
pub const PROPERTY_TYPES: &[(i64, &str)] = &[
    (1, "Abitazioni signorili"),
    (13, "Box e autorimesse"),
    (19, "Abitazioni tipiche dei luoghi"),
    (20, "Abitazioni civili"),
    (21, "Abitazioni di tipo economico"),
    (22, "Ville e villini"),
];

#[derive(Debug, Clone, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneInfo {
    pub link_zona: String,
    pub zone_code: String,
    pub fascia: Option<String>,
    pub municipality: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl From<&ResolvedZone> for ZoneInfo {
    fn from(zone: &ResolvedZone) -> Self {
        Self {
            link_zona: zone.link_zona.clone(),
            zone_code: zone.zone_code.clone(),
            fascia: zone.fascia.clone(),
            municipality: zone.municipality_name.clone(),
            description: zone.zone_description.clone(),
            distance_m: zone.distance_m,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotationItem {
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

impl From<&Quotation> for QuotationItem {
    fn from(q: &Quotation) -> Self {
        Self {
            property_type_desc: q.property_type_desc.clone(),
            conservation_state: q.conservation_state.clone(),
            is_prevalent: q.is_prevalent,
            price_min: q.price_min,
            price_max: q.price_max,
            surface_type_sale: q.surface_type_sale.clone(),
            rent_min: q.rent_min,
            rent_max: q.rent_max,
            surface_type_rent: q.surface_type_rent.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparableItem {
    pub transaction_date: Option<chrono::NaiveDate>,
    pub declared_price: Option<f64>,
    pub cadastral_category: Option<String>,
    pub cadastral_vani: Option<f64>,
    pub cadastral_mq: Option<f64>,
    pub notes: Option<String>,
}

impl From<&Transaction> for ComparableItem {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_date: tx.transaction_date,
            declared_price: tx.declared_price,
            cadastral_category: tx.cadastral_category.clone(),
            cadastral_vani: tx.cadastral_vani,
            cadastral_mq: tx.cadastral_mq,
            notes: tx.notes.clone(),
        }
    }
}

/// Simple linear estimate from the reference quotation band
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub min: f64,
    pub max: f64,
    pub mid: f64,
    pub eur_per_m2_range: [f64; 2],
}

#[derive(Debug, Serialize)]
pub struct ValuationOutcome {
    pub address: String,
    pub coordinates: Coordinates,
    pub zone: ZoneInfo,
    pub semester: String,
    pub quotations: Vec<QuotationItem>,
    pub estimate: Option<Estimate>,
    pub comparables: Vec<ComparableItem>,
}

/// Price band for one conservation state
#[derive(Debug, Clone, Serialize)]
pub struct StateBand {
    pub price_min: f64,
    pub price_max: f64,
    pub is_prevalent: bool,
    pub surface_type_sale: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnhancedOutcome {
    pub address: String,
    pub coordinates: Coordinates,
    pub zone: ZoneInfo,
    pub semester: String,
    pub quotations_by_state: BTreeMap<String, StateBand>,
    pub adjusted_estimate: AdjustedEstimate,
    pub comparables: Vec<ComparableItem>,
}

// ---------------------------------------------------------------------------
// Input validation, before any external call
// ---------------------------------------------------------------------------

pub fn validate_property_type(code: i64) -> Result<()> {
    if PROPERTY_TYPES.iter().any(|(known, _)| *known == code) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "unknown property type code {code}"
        )))
    }
}

pub fn validate_surface(surface_m2: f64) -> Result<()> {
    if surface_m2 > 0.0 && surface_m2.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "surface_m2 must be positive, got {surface_m2}"
        )))
    }
}

/// Semesters look like "2024_S2"
pub fn validate_semester(semester: &str) -> Result<()> {
    let bytes = semester.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && &semester[4..6] == "_S"
        && matches!(&semester[6..], "1" | "2");
    if well_formed {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "malformed semester '{semester}', expected YYYY_S1 or YYYY_S2"
        )))
    }
}

// ---------------------------------------------------------------------------
// Reusable pipeline steps
// ---------------------------------------------------------------------------

/// Geocode an address and find its OMI zone.
async fn geocode_and_locate(
    state: &AppState,
    address: &str,
    semester: Option<&str>,
) -> Result<(GeoPoint, ResolvedZone, String)> {
    let coords = state
        .geocoder
        .geocode(address, &state.db)
        .await?
        .ok_or_else(|| Error::AddressNotFound(address.to_string()))?;

    let semester = match semester {
        Some(s) => s.to_string(),
        None => state.zones.latest_semester().await?,
    };

    let index = state.zones.index_for(&semester).await?;
    let zone = index.locate(coords.lat, coords.lng).ok_or(Error::ZoneNotFound {
        lat: coords.lat,
        lng: coords.lng,
    })?;

    Ok((coords, zone, semester))
}

/// The prevalent quotation, or the first available if none is flagged.
fn reference_quotation(quotations: &[Quotation]) -> Option<&Quotation> {
    quotations
        .iter()
        .find(|q| q.is_prevalent)
        .or_else(|| quotations.first())
}

/// Band × surface estimate; requires a surface and a complete positive band.
fn simple_estimate(quotations: &[Quotation], surface_m2: Option<f64>) -> Option<Estimate> {
    let quotation = reference_quotation(quotations)?;
    let surface = surface_m2?;
    let min = quotation.price_min.filter(|v| *v > 0.0)?;
    let max = quotation.price_max.filter(|v| *v > 0.0)?;
    let mid = (min + max) / 2.0;

    Some(Estimate {
        min: round2(min * surface),
        max: round2(max * surface),
        mid: round2(mid * surface),
        eur_per_m2_range: [min, max],
    })
}

/// Group quotations by conservation state, keeping only states with a
/// complete band. Input arrives prevalent-first, and the first row per
/// state wins, so insertion order doubles as fallback preference order.
fn group_by_state(quotations: &[Quotation]) -> Vec<(String, StateBand)> {
    let mut grouped: Vec<(String, StateBand)> = Vec::new();
    for quotation in quotations {
        let Some(state) = quotation
            .conservation_state
            .clone()
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let (Some(price_min), Some(price_max)) = (quotation.price_min, quotation.price_max)
        else {
            continue;
        };
        if price_min > price_max {
            debug!(
                link_zona = %quotation.link_zona,
                state = %state,
                price_min,
                price_max,
                "Quotation band has min above max; keeping as-is"
            );
        }
        if grouped.iter().any(|(existing, _)| *existing == state) {
            continue;
        }
        grouped.push((
            state,
            StateBand {
                price_min,
                price_max,
                is_prevalent: quotation.is_prevalent,
                surface_type_sale: quotation.surface_type_sale.clone(),
            },
        ));
    }
    grouped
}

/// Base-band selection: an ordered list of strategies tried in sequence -
/// the requested state, then the prevalent state, then the first grouped
/// state.
fn select_base_state<'a>(
    grouped: &'a [(String, StateBand)],
    requested: &str,
) -> Option<(&'a str, &'a StateBand)> {
    grouped
        .iter()
        .find(|(state, _)| state.as_str() == requested)
        .or_else(|| grouped.iter().find(|(_, band)| band.is_prevalent))
        .or_else(|| grouped.first())
        .map(|(state, band)| (state.as_str(), band))
}

// ---------------------------------------------------------------------------
// Basic valuation
// ---------------------------------------------------------------------------

/// Full valuation pipeline for an address.
pub async fn valuate_address(
    state: &AppState,
    address: &str,
    property_type: i64,
    surface_m2: Option<f64>,
    semester: Option<&str>,
) -> Result<ValuationOutcome> {
    validate_property_type(property_type)?;
    if let Some(surface) = surface_m2 {
        validate_surface(surface)?;
    }
    if let Some(semester) = semester {
        validate_semester(semester)?;
    }

    let (coords, zone, semester) = geocode_and_locate(state, address, semester).await?;

    // Independent reads: neither depends on the other's result
    let (quotations, comparables) = tokio::try_join!(
        crate::db::quotations_for(&state.db, &zone.link_zona, &semester, property_type),
        crate::db::comparables_for(&state.db, &zone.link_zona, &zone.zone_code, COMPARABLE_LIMIT),
    )?;

    let estimate = simple_estimate(&quotations, surface_m2);

    Ok(ValuationOutcome {
        address: address.to_string(),
        coordinates: Coordinates {
            lat: coords.lat,
            lng: coords.lng,
        },
        zone: ZoneInfo::from(&zone),
        semester,
        quotations: quotations.iter().map(QuotationItem::from).collect(),
        estimate,
        comparables: comparables.iter().map(ComparableItem::from).collect(),
    })
}

// ---------------------------------------------------------------------------
// Enhanced valuation (with correction coefficients)
// ---------------------------------------------------------------------------

/// Enhanced valuation with correction coefficients applied.
///
/// Unlike the basic pipeline this one cannot degrade when quotation data is
/// missing: coefficient adjustment is meaningless without a base band, so an
/// empty quotation set is a hard failure.
pub async fn enhanced_valuate_address(
    state: &AppState,
    address: &str,
    property_type: i64,
    surface_m2: f64,
    semester: Option<&str>,
    property_details: &HashMap<String, String>,
) -> Result<EnhancedOutcome> {
    validate_property_type(property_type)?;
    validate_surface(surface_m2)?;
    if let Some(semester) = semester {
        validate_semester(semester)?;
    }

    let (coords, zone, semester) = geocode_and_locate(state, address, semester).await?;

    let (quotations, comparables) = tokio::try_join!(
        crate::db::quotations_for(&state.db, &zone.link_zona, &semester, property_type),
        crate::db::comparables_for(&state.db, &zone.link_zona, &zone.zone_code, COMPARABLE_LIMIT),
    )?;

    let grouped = group_by_state(&quotations);
    let requested = property_details
        .get("conservation_state")
        .map(String::as_str)
        .unwrap_or("NORMALE");

    // Selection fails only when no state carries a complete band: rows
    // without one leave nothing to adjust, the same hard failure as an
    // empty quotation set.
    let Some((selected_state, base)) = select_base_state(&grouped, requested) else {
        return Err(Error::NoQuotationData {
            link_zona: zone.link_zona.clone(),
            semester,
            property_type,
        });
    };

    // The conservation state determined the base band; it is not a
    // correction factor on top of it.
    let engine_details: HashMap<String, String> = property_details
        .iter()
        .filter(|(key, _)| key.as_str() != "conservation_state")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut adjusted = compute_adjusted_estimate(
        &state.coefficients,
        base.price_min,
        base.price_max,
        surface_m2,
        &engine_details,
    );
    adjusted.base_conservation_state = selected_state.to_string();
    adjusted.benchmark_comparison =
        Some(compare_with_benchmarks(adjusted.adjusted_mid, &comparables));

    Ok(EnhancedOutcome {
        address: address.to_string(),
        coordinates: Coordinates {
            lat: coords.lat,
            lng: coords.lng,
        },
        zone: ZoneInfo::from(&zone),
        semester,
        quotations_by_state: grouped.into_iter().collect(),
        adjusted_estimate: adjusted,
        comparables: comparables.iter().map(ComparableItem::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotation(
        state: Option<&str>,
        prevalent: bool,
        price_min: Option<f64>,
        price_max: Option<f64>,
    ) -> Quotation {
        Quotation {
            id: 0,
            link_zona: "IT00120-B1".to_string(),
            semester: "2024_S2".to_string(),
            property_type_code: 20,
            property_type_desc: Some("Abitazioni civili".to_string()),
            conservation_state: state.map(str::to_string),
            is_prevalent: prevalent,
            price_min,
            price_max,
            surface_type_sale: Some("L".to_string()),
            rent_min: None,
            rent_max: None,
            surface_type_rent: None,
        }
    }

    #[test]
    fn property_type_validation() {
        assert!(validate_property_type(20).is_ok());
        assert!(validate_property_type(22).is_ok());
        assert!(validate_property_type(99).is_err());
    }

    #[test]
    fn surface_validation() {
        assert!(validate_surface(85.5).is_ok());
        assert!(validate_surface(0.0).is_err());
        assert!(validate_surface(-10.0).is_err());
        assert!(validate_surface(f64::NAN).is_err());
    }

    #[test]
    fn semester_validation() {
        assert!(validate_semester("2024_S2").is_ok());
        assert!(validate_semester("1999_S1").is_ok());
        assert!(validate_semester("2024_S3").is_err());
        assert!(validate_semester("2024-S2").is_err());
        assert!(validate_semester("24_S2").is_err());
        assert!(validate_semester("").is_err());
    }

    #[test]
    fn reference_quotation_prefers_prevalent() {
        let quotations = vec![
            quotation(Some("SCADENTE"), false, Some(1000.0), Some(1500.0)),
            quotation(Some("NORMALE"), true, Some(1800.0), Some(2400.0)),
        ];
        let selected = reference_quotation(&quotations).unwrap();
        assert_eq!(selected.conservation_state.as_deref(), Some("NORMALE"));

        let none_prevalent = vec![
            quotation(Some("SCADENTE"), false, Some(1000.0), Some(1500.0)),
            quotation(Some("NORMALE"), false, Some(1800.0), Some(2400.0)),
        ];
        let selected = reference_quotation(&none_prevalent).unwrap();
        assert_eq!(selected.conservation_state.as_deref(), Some("SCADENTE"));
    }

    #[test]
    fn simple_estimate_needs_surface_and_complete_band() {
        let quotations = vec![quotation(Some("NORMALE"), true, Some(2000.0), Some(3000.0))];
        assert!(simple_estimate(&quotations, None).is_none());

        let estimate = simple_estimate(&quotations, Some(100.0)).unwrap();
        assert_eq!(estimate.min, 200_000.0);
        assert_eq!(estimate.max, 300_000.0);
        assert_eq!(estimate.mid, 250_000.0);
        assert_eq!(estimate.eur_per_m2_range, [2000.0, 3000.0]);

        let incomplete = vec![quotation(Some("NORMALE"), true, Some(2000.0), None)];
        assert!(simple_estimate(&incomplete, Some(100.0)).is_none());

        let zeroed = vec![quotation(Some("NORMALE"), true, Some(0.0), Some(3000.0))];
        assert!(simple_estimate(&zeroed, Some(100.0)).is_none());
    }

    #[test]
    fn grouping_keeps_complete_bands_in_arrival_order() {
        let quotations = vec![
            quotation(Some("NORMALE"), true, Some(1800.0), Some(2400.0)),
            quotation(Some("OTTIMO"), false, Some(2400.0), Some(3100.0)),
            quotation(Some("SCADENTE"), false, Some(1200.0), None), // incomplete
            quotation(None, false, Some(900.0), Some(1000.0)),      // no state
        ];
        let grouped = group_by_state(&quotations);
        let states: Vec<&str> = grouped.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(states, ["NORMALE", "OTTIMO"]);
        assert!(grouped[0].1.is_prevalent);
    }

    #[test]
    fn base_state_selection_follows_strategy_order() {
        let grouped = vec![
            (
                "NORMALE".to_string(),
                StateBand {
                    price_min: 1800.0,
                    price_max: 2400.0,
                    is_prevalent: true,
                    surface_type_sale: None,
                },
            ),
            (
                "OTTIMO".to_string(),
                StateBand {
                    price_min: 2400.0,
                    price_max: 3100.0,
                    is_prevalent: false,
                    surface_type_sale: None,
                },
            ),
        ];

        // Requested state present
        let (state, band) = select_base_state(&grouped, "OTTIMO").unwrap();
        assert_eq!(state, "OTTIMO");
        assert_eq!(band.price_min, 2400.0);

        // Requested state absent: prevalent wins
        let (state, _) = select_base_state(&grouped, "SCADENTE").unwrap();
        assert_eq!(state, "NORMALE");

        // No prevalent either: first grouped state
        let no_prevalent: Vec<(String, StateBand)> = grouped
            .iter()
            .map(|(s, b)| {
                (
                    s.clone(),
                    StateBand {
                        is_prevalent: false,
                        ..b.clone()
                    },
                )
            })
            .collect();
        let (state, _) = select_base_state(&no_prevalent, "SCADENTE").unwrap();
        assert_eq!(state, "NORMALE");

        assert!(select_base_state(&[], "NORMALE").is_none());
    }
}
