//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to
//! date. All statements are idempotent (`CREATE TABLE IF NOT EXISTS`), so
//! init is safe to call on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers during ETL bulk loads
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent).
///
/// Public so tests can apply the schema to an in-memory pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_zones_table(pool).await?;
    create_quotations_table(pool).await?;
    create_transactions_table(pool).await?;
    create_geocode_cache_table(pool).await?;
    Ok(())
}

async fn create_zones_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS zones (
            id INTEGER PRIMARY KEY,
            link_zona TEXT NOT NULL,
            zone_code TEXT NOT NULL,
            fascia TEXT,
            municipality_istat TEXT NOT NULL,
            municipality_name TEXT,
            province_code TEXT,
            zone_description TEXT,
            semester TEXT NOT NULL,
            geometry TEXT NOT NULL,
            UNIQUE (link_zona, semester)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_zones_semester ON zones (semester)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_quotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quotations (
            id INTEGER PRIMARY KEY,
            link_zona TEXT NOT NULL,
            semester TEXT NOT NULL,
            property_type_code INTEGER NOT NULL,
            property_type_desc TEXT,
            conservation_state TEXT,
            is_prevalent INTEGER NOT NULL DEFAULT 0,
            price_min REAL,
            price_max REAL,
            surface_type_sale TEXT,
            rent_min REAL,
            rent_max REAL,
            surface_type_rent TEXT,
            FOREIGN KEY (link_zona, semester) REFERENCES zones (link_zona, semester)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_quotations_zone \
         ON quotations (link_zona, semester, property_type_code)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_transactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            transaction_date TEXT,
            transaction_type TEXT,
            declared_price REAL,
            municipality TEXT,
            omi_zone TEXT,
            link_zona TEXT,
            cadastral_category TEXT,
            cadastral_vani REAL,
            cadastral_mq REAL,
            cadastral_mc REAL,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_zone ON transactions (link_zona, omi_zone)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_geocode_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS geocode_cache (
            address TEXT PRIMARY KEY,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool")
    }

    #[tokio::test]
    async fn schema_creates_all_tables() {
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in ["geocode_cache", "quotations", "transactions", "zones"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn zones_unique_per_semester() {
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();

        let insert = "INSERT INTO zones (link_zona, zone_code, municipality_istat, semester, geometry) \
                      VALUES (?, ?, ?, ?, ?)";
        sqlx::query(insert)
            .bind("IT00120-B1")
            .bind("B1")
            .bind("001272")
            .bind("2024_S2")
            .bind("{}")
            .execute(&pool)
            .await
            .unwrap();

        // Same zone, same semester: rejected
        let dup = sqlx::query(insert)
            .bind("IT00120-B1")
            .bind("B1")
            .bind("001272")
            .bind("2024_S2")
            .bind("{}")
            .execute(&pool)
            .await;
        assert!(dup.is_err());

        // Same zone, later semester: supersedes, not replaces
        sqlx::query(insert)
            .bind("IT00120-B1")
            .bind("B1")
            .bind("001272")
            .bind("2025_S1")
            .bind("{}")
            .execute(&pool)
            .await
            .unwrap();
    }
}
