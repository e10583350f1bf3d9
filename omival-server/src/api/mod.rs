//! HTTP API handlers

pub mod health;
pub mod semesters;
pub mod transactions;
pub mod valuations;
pub mod zones;

use crate::error::Result;
use crate::services::valuation::validate_semester;
use crate::AppState;

/// The caller's semester (validated), or the most recent one in storage.
pub(crate) async fn resolve_semester(
    state: &AppState,
    semester: Option<String>,
) -> Result<String> {
    match semester {
        Some(semester) => {
            validate_semester(&semester)?;
            Ok(semester)
        }
        None => state.zones.latest_semester().await,
    }
}
