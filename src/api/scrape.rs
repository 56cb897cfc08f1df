use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;
use tracing::error;

use super::types::{ScrapeQuery, ScrapeResponse};
use super::{ApiError, ApiResponse, AppState};
use crate::services::ScrapeRequest;

/// `POST /api/scrape/batch?source=&force=&price_min=&price_max=`
///
/// Bad requests are rejected before anything is launched. The scrape itself
/// runs on a detached task and keeps going if the client disconnects.
pub async fn scrape_batch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScrapeQuery>,
) -> Result<Json<ApiResponse<ScrapeResponse>>, ApiError> {
    let request = ScrapeRequest::try_from(query)?;
    state.scrape().validate(&request)?;

    let outcome = state.scrape().spawn(request).await.map_err(|e| {
        error!(event = "scrape_task_failed", error = %e, "Scrape task panicked or was cancelled");
        ApiError::internal(e.to_string())
    })??;

    Ok(Json(ApiResponse::success(ScrapeResponse::from(outcome))))
}
