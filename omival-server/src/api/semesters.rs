//! Semester listing endpoint

use crate::error::Result;
use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SemesterListResponse {
    pub semesters: Vec<String>,
    pub latest: Option<String>,
}

/// GET /api/semesters: all available data semesters, most recent first.
pub async fn list_semesters(State(state): State<AppState>) -> Result<Json<SemesterListResponse>> {
    let semesters = state.zones.semesters().await?;
    let latest = semesters.first().cloned();
    Ok(Json(SemesterListResponse { semesters, latest }))
}
