//! Comparable transaction queries and CRUD

use chrono::NaiveDate;
use omival_common::db::Transaction;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const TRANSACTION_COLUMNS: &str = "id, transaction_date, transaction_type, declared_price, \
    municipality, omi_zone, link_zona, cadastral_category, cadastral_vani, cadastral_mq, \
    cadastral_mc, notes, created_at";

/// Most recent comparables for a zone.
///
/// A record may carry the current zone reference (`link_zona`), only the
/// legacy OMI zone code, or both; either key links it to the zone.
pub async fn comparables_for(
    pool: &SqlitePool,
    link_zona: &str,
    zone_code: &str,
    limit: i64,
) -> sqlx::Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions \
         WHERE link_zona = ? OR omi_zone = ? \
         ORDER BY transaction_date DESC LIMIT ?"
    );
    sqlx::query_as::<_, Transaction>(&sql)
        .bind(link_zona)
        .bind(zone_code)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Incoming transaction fields for create and partial update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionChanges {
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
}

impl TransactionChanges {
    pub fn is_empty(&self) -> bool {
        self.transaction_date.is_none()
            && self.transaction_type.is_none()
            && self.declared_price.is_none()
            && self.municipality.is_none()
            && self.omi_zone.is_none()
            && self.link_zona.is_none()
            && self.cadastral_category.is_none()
            && self.cadastral_vani.is_none()
            && self.cadastral_mq.is_none()
            && self.cadastral_mc.is_none()
            && self.notes.is_none()
    }
}

pub async fn insert_transaction(
    pool: &SqlitePool,
    data: &TransactionChanges,
) -> sqlx::Result<Transaction> {
    let result = sqlx::query(
        "INSERT INTO transactions \
            (transaction_date, transaction_type, declared_price, municipality, omi_zone, \
             link_zona, cadastral_category, cadastral_vani, cadastral_mq, cadastral_mc, notes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(data.transaction_date)
    .bind(&data.transaction_type)
    .bind(data.declared_price)
    .bind(&data.municipality)
    .bind(&data.omi_zone)
    .bind(&data.link_zona)
    .bind(&data.cadastral_category)
    .bind(data.cadastral_vani)
    .bind(data.cadastral_mq)
    .bind(data.cadastral_mc)
    .bind(&data.notes)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
    sqlx::query_as::<_, Transaction>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn get_transaction(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Transaction>> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
    sqlx::query_as::<_, Transaction>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Transactions, optionally filtered by zone reference or municipality.
pub async fn list_transactions(
    pool: &SqlitePool,
    link_zona: Option<&str>,
    municipality: Option<&str>,
) -> sqlx::Result<Vec<Transaction>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1"
    ));
    if let Some(link_zona) = link_zona {
        builder.push(" AND link_zona = ").push_bind(link_zona);
    }
    if let Some(municipality) = municipality {
        builder
            .push(" AND UPPER(municipality) = UPPER(")
            .push_bind(municipality)
            .push(")");
    }
    builder.push(" ORDER BY transaction_date DESC");

    builder.build_query_as::<Transaction>().fetch_all(pool).await
}

/// Update the fields present in `data`. Returns false when no row has the
/// given id. The caller must reject an all-empty update first.
pub async fn update_transaction(
    pool: &SqlitePool,
    id: i64,
    data: &TransactionChanges,
) -> sqlx::Result<bool> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE transactions SET ");
    let mut fields = builder.separated(", ");

    if let Some(value) = data.transaction_date {
        fields.push("transaction_date = ").push_bind_unseparated(value);
    }
    if let Some(value) = &data.transaction_type {
        fields.push("transaction_type = ").push_bind_unseparated(value);
    }
    if let Some(value) = data.declared_price {
        fields.push("declared_price = ").push_bind_unseparated(value);
    }
    if let Some(value) = &data.municipality {
        fields.push("municipality = ").push_bind_unseparated(value);
    }
    if let Some(value) = &data.omi_zone {
        fields.push("omi_zone = ").push_bind_unseparated(value);
    }
    if let Some(value) = &data.link_zona {
        fields.push("link_zona = ").push_bind_unseparated(value);
    }
    if let Some(value) = &data.cadastral_category {
        fields.push("cadastral_category = ").push_bind_unseparated(value);
    }
    if let Some(value) = data.cadastral_vani {
        fields.push("cadastral_vani = ").push_bind_unseparated(value);
    }
    if let Some(value) = data.cadastral_mq {
        fields.push("cadastral_mq = ").push_bind_unseparated(value);
    }
    if let Some(value) = data.cadastral_mc {
        fields.push("cadastral_mc = ").push_bind_unseparated(value);
    }
    if let Some(value) = &data.notes {
        fields.push("notes = ").push_bind_unseparated(value);
    }

    builder.push(" WHERE id = ").push_bind(id);
    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_transaction(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
