//! Health endpoints, used by container probes and the frontend status badge.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database: bool,
    pub sources: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

/// `GET /api/system/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();
    let body = HealthResponse {
        status: if database { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database,
        sources: state.scrape().registry().all().len(),
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::success(body))).into_response()
}

/// `GET /api/system/health/live`
pub async fn health_live() -> Json<HealthLiveResponse> {
    Json(HealthLiveResponse { status: "alive" })
}

/// `GET /api/system/health/ready`
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    match state.store().ping().await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success("ready"))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<()>::error("database unavailable")),
            )
                .into_response()
        }
    }
}
