//! Spatial OMI zone resolution
//!
//! Zone polygons live in SQLite as GeoJSON text; each semester's rows are
//! hydrated once into an in-memory [`ZoneIndex`] of parsed multipolygons
//! with precomputed bounding boxes. Lookup is exact point-in-polygon first,
//! then nearest zone boundary within a hard 200 m haversine cutoff. Points
//! farther than that from every zone are "not found", not weak matches:
//! silently assigning an address to a neighborhood it is not in would be
//! worse than admitting defeat.

use crate::error::{Error, Result};
use geo::{
    BoundingRect, Closest, Contains, HaversineClosestPoint, HaversineDistance, MultiPolygon,
    Point, Rect,
};
use geojson::GeoJson;
use omival_common::db::ZoneRecord;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Hard cutoff for the nearest-zone fallback, geodesic meters
pub const FALLBACK_RADIUS_M: f64 = 200.0;

/// Bounding-box search margin in degrees. Generous enough to cover 200 m of
/// longitude anywhere in Italy (200 m ≈ 0.0027° at 47°N).
const FALLBACK_MARGIN_DEG: f64 = 0.005;

/// A zone matched to a point. `distance_m` is present only for fallback
/// matches: None means the point lies inside the polygon.
#[derive(Debug, Clone)]
pub struct ResolvedZone {
    pub link_zona: String,
    pub zone_code: String,
    pub fascia: Option<String>,
    pub municipality_name: Option<String>,
    pub zone_description: Option<String>,
    pub distance_m: Option<f64>,
}

/// One hydrated zone polygon
#[derive(Debug, Clone)]
pub struct IndexedZone {
    pub link_zona: String,
    pub zone_code: String,
    pub fascia: Option<String>,
    pub municipality_name: Option<String>,
    pub zone_description: Option<String>,
    /// Original GeoJSON text, passed through to map responses unparsed
    pub raw_geometry: String,
    geometry: MultiPolygon<f64>,
    bbox: Rect<f64>,
}

impl IndexedZone {
    fn resolved(&self, distance_m: Option<f64>) -> ResolvedZone {
        ResolvedZone {
            link_zona: self.link_zona.clone(),
            zone_code: self.zone_code.clone(),
            fascia: self.fascia.clone(),
            municipality_name: self.municipality_name.clone(),
            zone_description: self.zone_description.clone(),
            distance_m,
        }
    }
}

/// Point-containment and bounded nearest-neighbor search over one
/// semester's zones.
#[derive(Debug)]
pub struct ZoneIndex {
    semester: String,
    zones: Vec<IndexedZone>,
}

impl ZoneIndex {
    /// Hydrate an index from zone rows. Rows with unparseable geometry are
    /// skipped with a warning: upstream data is imperfect and one bad
    /// polygon must not take down the whole semester.
    pub fn from_rows(semester: impl Into<String>, rows: Vec<ZoneRecord>) -> Self {
        let semester = semester.into();
        let mut zones = Vec::with_capacity(rows.len());

        for row in rows {
            let geometry = match parse_multipolygon(&row.geometry) {
                Ok(geometry) => geometry,
                Err(reason) => {
                    warn!(
                        link_zona = %row.link_zona,
                        semester = %semester,
                        %reason,
                        "Skipping zone with unparseable geometry"
                    );
                    continue;
                }
            };
            let Some(bbox) = geometry.bounding_rect() else {
                warn!(
                    link_zona = %row.link_zona,
                    semester = %semester,
                    "Skipping zone with empty geometry"
                );
                continue;
            };
            zones.push(IndexedZone {
                link_zona: row.link_zona,
                zone_code: row.zone_code,
                fascia: row.fascia,
                municipality_name: row.municipality_name,
                zone_description: row.zone_description,
                raw_geometry: row.geometry,
                geometry,
                bbox,
            });
        }

        Self { semester, zones }
    }

    pub fn semester(&self) -> &str {
        &self.semester
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Find the zone containing a point, falling back to the nearest zone
    /// boundary within [`FALLBACK_RADIUS_M`].
    pub fn locate(&self, lat: f64, lng: f64) -> Option<ResolvedZone> {
        let point = Point::new(lng, lat);

        let contained: Vec<&IndexedZone> = self
            .zones
            .iter()
            .filter(|z| bbox_contains(&z.bbox, point, 0.0) && z.geometry.contains(&point))
            .collect();

        if let Some(first) = contained.first() {
            if contained.len() > 1 {
                // Same-semester zones should never overlap; upstream data
                // corruption. Keep serving: any of the matches is usable.
                let links: Vec<&str> = contained.iter().map(|z| z.link_zona.as_str()).collect();
                warn!(
                    lat,
                    lng,
                    zones = ?links,
                    "Point contained by multiple zones of one semester"
                );
            }
            return Some(first.resolved(None));
        }

        let mut best: Option<(f64, &IndexedZone)> = None;
        for zone in &self.zones {
            if !bbox_contains(&zone.bbox, point, FALLBACK_MARGIN_DEG) {
                continue;
            }
            if let Some(distance) = boundary_distance_m(&zone.geometry, point) {
                if distance <= FALLBACK_RADIUS_M
                    && best.map_or(true, |(current, _)| distance < current)
                {
                    best = Some((distance, zone));
                }
            }
        }

        best.map(|(distance, zone)| {
            info!(
                lat,
                lng,
                link_zona = %zone.link_zona,
                distance_m = distance,
                "No exact zone match, using nearest zone within fallback radius"
            );
            zone.resolved(Some(distance))
        })
    }

    /// Zones whose bounding box intersects the given
    /// (min_lng, min_lat, max_lng, max_lat) envelope; all zones when None.
    pub fn zones_in_envelope(&self, envelope: Option<[f64; 4]>) -> Vec<&IndexedZone> {
        self.zones
            .iter()
            .filter(|z| match envelope {
                None => true,
                Some([min_lng, min_lat, max_lng, max_lat]) => {
                    z.bbox.min().x <= max_lng
                        && z.bbox.max().x >= min_lng
                        && z.bbox.min().y <= max_lat
                        && z.bbox.max().y >= min_lat
                }
            })
            .collect()
    }
}

/// Per-semester zone indexes hydrated on demand from storage.
///
/// Zone rows are immutable once imported (new semesters supersede old ones
/// instead of replacing them), so a hydrated index never goes stale.
#[derive(Debug)]
pub struct SpatialCatalog {
    pool: SqlitePool,
    cache: RwLock<HashMap<String, Arc<ZoneIndex>>>,
}

impl SpatialCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The index for one semester. Distinguishes "no zone rows exist for
    /// this semester at all" from a point simply matching no zone.
    pub async fn index_for(&self, semester: &str) -> Result<Arc<ZoneIndex>> {
        if let Some(index) = self.cache.read().await.get(semester) {
            return Ok(index.clone());
        }

        let rows = crate::db::zone_rows_for_semester(&self.pool, semester).await?;
        if rows.is_empty() {
            return Err(Error::NoSemesterData(semester.to_string()));
        }

        let index = Arc::new(ZoneIndex::from_rows(semester, rows));
        info!(semester, zones = index.len(), "Hydrated zone index");

        self.cache
            .write()
            .await
            .insert(semester.to_string(), index.clone());
        Ok(index)
    }

    /// Most recent semester present in storage. Semester identifiers sort
    /// correctly as strings ("YYYY_S1" < "YYYY_S2" < "YYYY+1_S1").
    pub async fn latest_semester(&self) -> Result<String> {
        crate::db::latest_semester(&self.pool)
            .await?
            .ok_or(Error::NoData)
    }

    /// All semesters present in storage, most recent first.
    pub async fn semesters(&self) -> Result<Vec<String>> {
        Ok(crate::db::distinct_semesters(&self.pool).await?)
    }
}

fn parse_multipolygon(raw: &str) -> std::result::Result<MultiPolygon<f64>, String> {
    let geojson: GeoJson = raw
        .parse()
        .map_err(|e| format!("invalid GeoJSON: {e}"))?;
    let GeoJson::Geometry(geometry) = geojson else {
        return Err("expected a bare GeoJSON geometry".to_string());
    };
    let geometry = geo::Geometry::<f64>::try_from(geometry)
        .map_err(|e| format!("unsupported geometry: {e}"))?;
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        other => Err(format!("expected (Multi)Polygon, got {other:?}")),
    }
}

fn bbox_contains(rect: &Rect<f64>, point: Point<f64>, margin: f64) -> bool {
    point.x() >= rect.min().x - margin
        && point.x() <= rect.max().x + margin
        && point.y() >= rect.min().y - margin
        && point.y() <= rect.max().y + margin
}

/// Haversine distance from a point to the nearest ring of a multipolygon.
fn boundary_distance_m(geometry: &MultiPolygon<f64>, point: Point<f64>) -> Option<f64> {
    let mut best: Option<f64> = None;
    for polygon in &geometry.0 {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
        for ring in rings {
            let candidate = match ring.haversine_closest_point(&point) {
                Closest::Intersection(p) | Closest::SinglePoint(p) => {
                    point.haversine_distance(&p)
                }
                Closest::Indeterminate => continue,
            };
            if best.map_or(true, |current| candidate < current) {
                best = Some(candidate);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Axis-aligned square polygon as GeoJSON text
    fn square_geojson(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> String {
        format!(
            r#"{{"type":"Polygon","coordinates":[[[{min_lng},{min_lat}],[{max_lng},{min_lat}],[{max_lng},{max_lat}],[{min_lng},{max_lat}],[{min_lng},{min_lat}]]]}}"#
        )
    }

    fn zone_row(id: i64, link_zona: &str, geometry: String) -> ZoneRecord {
        ZoneRecord {
            id,
            link_zona: link_zona.to_string(),
            zone_code: format!("B{id}"),
            fascia: Some("B".to_string()),
            municipality_istat: "001272".to_string(),
            municipality_name: Some("Torino".to_string()),
            province_code: Some("TO".to_string()),
            zone_description: Some("Centro".to_string()),
            semester: "2024_S2".to_string(),
            geometry,
        }
    }

    fn two_zone_index() -> ZoneIndex {
        ZoneIndex::from_rows(
            "2024_S2",
            vec![
                zone_row(1, "IT00120-B1", square_geojson(9.00, 45.00, 9.01, 45.01)),
                zone_row(2, "IT00120-B2", square_geojson(9.02, 45.00, 9.03, 45.01)),
            ],
        )
    }

    #[test]
    fn point_inside_resolves_without_distance() {
        let index = two_zone_index();
        let result = index.locate(45.005, 9.005).expect("inside first square");
        assert_eq!(result.link_zona, "IT00120-B1");
        assert!(result.distance_m.is_none());

        let result = index.locate(45.005, 9.025).expect("inside second square");
        assert_eq!(result.link_zona, "IT00120-B2");
    }

    #[test]
    fn nearby_point_resolves_with_distance_within_cutoff() {
        let index = two_zone_index();
        // ~100 m east of the first square's eastern edge
        // (0.00127° of longitude at 45°N)
        let result = index.locate(45.005, 9.01127).expect("within 200 m");
        assert_eq!(result.link_zona, "IT00120-B1");
        let distance = result.distance_m.expect("fallback annotates distance");
        assert!(
            (50.0..150.0).contains(&distance),
            "distance was {distance}"
        );
        assert!(distance <= FALLBACK_RADIUS_M);
    }

    #[test]
    fn point_beyond_cutoff_is_not_found() {
        let index = two_zone_index();
        // ~500 m east of the first square, ~280 m west of the second
        let result = index.locate(45.005, 9.0164);
        assert!(result.is_none());
    }

    #[test]
    fn nearest_of_several_candidate_zones_wins() {
        let index = two_zone_index();
        // Between the squares, ~680 m east of B1 and ~110 m west of B2:
        // only B2 is inside the cutoff
        let near_b2 = index.locate(45.005, 9.0186).expect("within 200 m of B2");
        assert_eq!(near_b2.link_zona, "IT00120-B2");
    }

    #[test]
    fn overlapping_zones_return_a_single_match() {
        // Same square twice: corrupt upstream data, logged but served
        let index = ZoneIndex::from_rows(
            "2024_S2",
            vec![
                zone_row(1, "IT00120-B1", square_geojson(9.00, 45.00, 9.01, 45.01)),
                zone_row(2, "IT00120-B1-dup", square_geojson(9.00, 45.00, 9.01, 45.01)),
            ],
        );
        let result = index.locate(45.005, 9.005).expect("still resolves");
        assert_eq!(result.link_zona, "IT00120-B1");
        assert!(result.distance_m.is_none());
    }

    #[test]
    fn unparseable_geometry_is_skipped_not_fatal() {
        let index = ZoneIndex::from_rows(
            "2024_S2",
            vec![
                zone_row(1, "IT00120-BAD", "not geojson at all".to_string()),
                zone_row(2, "IT00120-B2", square_geojson(9.02, 45.00, 9.03, 45.01)),
            ],
        );
        assert_eq!(index.len(), 1);
        let result = index.locate(45.005, 9.025).expect("good zone still found");
        assert_eq!(result.link_zona, "IT00120-B2");
    }

    #[test]
    fn multipolygon_geometry_is_supported() {
        let raw = r#"{"type":"MultiPolygon","coordinates":[[[[9.0,45.0],[9.01,45.0],[9.01,45.01],[9.0,45.01],[9.0,45.0]]],[[[9.05,45.0],[9.06,45.0],[9.06,45.01],[9.05,45.01],[9.05,45.0]]]]}"#;
        let index = ZoneIndex::from_rows("2024_S2", vec![zone_row(1, "IT00120-MP", raw.to_string())]);
        assert_eq!(index.len(), 1);
        // Inside either component polygon
        assert!(index.locate(45.005, 9.005).is_some());
        assert!(index.locate(45.005, 9.055).is_some());
        // In the gap between them, beyond 200 m of both
        assert!(index.locate(45.005, 9.03).is_none());
    }

    #[test]
    fn envelope_filter_selects_intersecting_zones() {
        let index = two_zone_index();
        assert_eq!(index.zones_in_envelope(None).len(), 2);
        let hits = index.zones_in_envelope(Some([8.99, 44.99, 9.015, 45.02]));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].link_zona, "IT00120-B1");
    }
}
