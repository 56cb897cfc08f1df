use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use super::types::{CountResponse, PropertyListResponse, PropertyQuery, SourceDto};
use super::{ApiError, ApiResponse, AppState};
use crate::db::{MapPoint, Property};
use crate::domain::Neighborhood;

/// `GET /api/properties`
pub async fn list_properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PropertyQuery>,
) -> Result<Json<ApiResponse<PropertyListResponse<Property>>>, ApiError> {
    let filter = query.filter();
    let page = query.page();

    let items = state
        .store()
        .list_properties(&filter, query.sort, page)
        .await?;
    let total = state.store().count_properties(&filter).await?;

    Ok(Json(ApiResponse::success(PropertyListResponse {
        items,
        total,
        skip: page.skip,
        limit: page.limit,
    })))
}

/// `GET /api/properties/count`
pub async fn count_properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PropertyQuery>,
) -> Result<Json<ApiResponse<CountResponse>>, ApiError> {
    let count = state.store().count_properties(&query.filter()).await?;
    Ok(Json(ApiResponse::success(CountResponse { count })))
}

/// `GET /api/properties/{id}`
pub async fn get_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Property>>, ApiError> {
    let property = state
        .store()
        .get_property(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Property", id))?;

    Ok(Json(ApiResponse::success(property)))
}

/// `GET /api/properties/locations`
///
/// Listings with coordinates, for the map view.
pub async fn list_map_points(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<MapPoint>>>, ApiError> {
    let points = state.store().list_map_points().await?;
    Ok(Json(ApiResponse::success(points)))
}

/// `GET /api/locations`
pub async fn list_locations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let locations = state.store().list_distinct_locations().await?;
    Ok(Json(ApiResponse::success(locations)))
}

/// `GET /api/neighborhoods`
pub async fn list_neighborhoods() -> Json<ApiResponse<Vec<&'static str>>> {
    Json(ApiResponse::success(
        Neighborhood::ALL.iter().map(|n| n.name()).collect(),
    ))
}

/// `GET /api/sources`
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<SourceDto>>>, ApiError> {
    let runs = state.store().list_scrape_runs().await?;

    let mut sources = Vec::new();
    for scraper in state.scrape().registry().all() {
        let run = runs.iter().find(|r| r.source == scraper.source());
        sources.push(SourceDto {
            slug: scraper.source().to_string(),
            name: scraper.display_name().to_string(),
            base_url: scraper.base_url().to_string(),
            properties: state
                .store()
                .count_properties_for_source(scraper.source())
                .await?,
            last_run_at: run.map(|r| r.last_run_at),
            last_summary: run.map(|r| r.summary.clone()),
        });
    }

    Ok(Json(ApiResponse::success(sources)))
}
