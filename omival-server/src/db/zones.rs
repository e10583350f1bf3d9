//! Zone and semester queries

use omival_common::db::ZoneRecord;
use sqlx::SqlitePool;

/// All zone rows of one semester, geometry included, for index hydration.
pub async fn zone_rows_for_semester(
    pool: &SqlitePool,
    semester: &str,
) -> sqlx::Result<Vec<ZoneRecord>> {
    sqlx::query_as::<_, ZoneRecord>(
        "SELECT id, link_zona, zone_code, fascia, municipality_istat, municipality_name, \
                province_code, zone_description, semester, geometry \
         FROM zones WHERE semester = ?",
    )
    .bind(semester)
    .fetch_all(pool)
    .await
}

/// Most recent semester with zone data. Semester identifiers ("YYYY_S1",
/// "YYYY_S2") sort correctly as strings, so MAX is the latest.
pub async fn latest_semester(pool: &SqlitePool) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar::<_, Option<String>>("SELECT MAX(semester) FROM zones")
        .fetch_one(pool)
        .await
}

/// All distinct semesters, most recent first.
pub async fn distinct_semesters(pool: &SqlitePool) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>("SELECT DISTINCT semester FROM zones ORDER BY semester DESC")
        .fetch_all(pool)
        .await
}
