//! Comparable transaction CRUD endpoints
//!
//! Transactions are the only user-maintained table; their lifecycle is
//! independent of the bulk-loaded OMI data.

use crate::db::TransactionChanges;
use crate::error::{Error, Result};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use omival_common::db::Transaction;
use serde::{Deserialize, Serialize};

/// POST /api/transactions: record a manually entered transaction.
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(data): Json<TransactionChanges>,
) -> Result<Json<Transaction>> {
    let transaction = crate::db::insert_transaction(&state.db, &data).await?;
    Ok(Json(transaction))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub link_zona: Option<String>,
    pub municipality: Option<String>,
}

/// GET /api/transactions: list transactions, optionally filtered.
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Transaction>>> {
    let transactions = crate::db::list_transactions(
        &state.db,
        query.link_zona.as_deref(),
        query.municipality.as_deref(),
    )
    .await?;
    Ok(Json(transactions))
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub id: i64,
    pub updated: bool,
}

/// PUT /api/transactions/:id: update the supplied fields.
pub async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(data): Json<TransactionChanges>,
) -> Result<Json<UpdateResponse>> {
    if data.is_empty() {
        return Err(Error::InvalidInput("no fields to update".to_string()));
    }
    if !crate::db::update_transaction(&state.db, id, &data).await? {
        return Err(Error::TransactionNotFound(id));
    }
    Ok(Json(UpdateResponse { id, updated: true }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: i64,
    pub deleted: bool,
}

/// DELETE /api/transactions/:id
pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>> {
    if !crate::db::delete_transaction(&state.db, id).await? {
        return Err(Error::TransactionNotFound(id));
    }
    Ok(Json(DeleteResponse { id, deleted: true }))
}
