//! Quotation queries

use omival_common::db::Quotation;
use sqlx::SqlitePool;
use std::collections::HashMap;

const QUOTATION_COLUMNS: &str = "id, link_zona, semester, property_type_code, \
    property_type_desc, conservation_state, is_prevalent, price_min, price_max, \
    surface_type_sale, rent_min, rent_max, surface_type_rent";

/// All conservation-state rows for one (zone, semester, property type).
///
/// Prevalent rows come first so downstream selection and grouping can take
/// the first hit per state.
pub async fn quotations_for(
    pool: &SqlitePool,
    link_zona: &str,
    semester: &str,
    property_type: i64,
) -> sqlx::Result<Vec<Quotation>> {
    let sql = format!(
        "SELECT {QUOTATION_COLUMNS} FROM quotations \
         WHERE link_zona = ? AND semester = ? AND property_type_code = ? \
         ORDER BY is_prevalent DESC, conservation_state"
    );
    sqlx::query_as::<_, Quotation>(&sql)
        .bind(link_zona)
        .bind(semester)
        .bind(property_type)
        .fetch_all(pool)
        .await
}

/// Every quotation of a zone across all property types.
pub async fn quotations_for_zone(
    pool: &SqlitePool,
    link_zona: &str,
    semester: &str,
) -> sqlx::Result<Vec<Quotation>> {
    let sql = format!(
        "SELECT {QUOTATION_COLUMNS} FROM quotations \
         WHERE link_zona = ? AND semester = ? \
         ORDER BY property_type_code, is_prevalent DESC"
    );
    sqlx::query_as::<_, Quotation>(&sql)
        .bind(link_zona)
        .bind(semester)
        .fetch_all(pool)
        .await
}

/// Prevalent price band per zone for one semester and property type, used
/// to decorate the zone map. First prevalent row per zone wins.
pub async fn prevalent_price_bands(
    pool: &SqlitePool,
    semester: &str,
    property_type: i64,
) -> sqlx::Result<HashMap<String, (Option<f64>, Option<f64>)>> {
    let rows = sqlx::query_as::<_, (String, Option<f64>, Option<f64>)>(
        "SELECT link_zona, price_min, price_max FROM quotations \
         WHERE semester = ? AND property_type_code = ? AND is_prevalent = 1",
    )
    .bind(semester)
    .bind(property_type)
    .fetch_all(pool)
    .await?;

    let mut bands = HashMap::with_capacity(rows.len());
    for (link_zona, price_min, price_max) in rows {
        bands.entry(link_zona).or_insert((price_min, price_max));
    }
    Ok(bands)
}
