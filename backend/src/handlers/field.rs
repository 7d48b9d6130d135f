//! Field management HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::field::CreateFieldInput;
use crate::services::field_data::AppendDataPointInput;
use crate::services::{CacheService, FieldDataService, FieldService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListFieldsQuery {
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDataQuery {
    pub limit: Option<u32>,
}

/// List fields, optionally filtered by owner
pub async fn list_fields(
    State(state): State<AppState>,
    Query(query): Query<ListFieldsQuery>,
) -> impl IntoResponse {
    let service = FieldService::new(state.db.clone());

    match service.list_fields(query.owner_id).await {
        Ok(fields) => (StatusCode::OK, Json(serde_json::json!({ "fields": fields }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Create a new field
pub async fn create_field(
    State(state): State<AppState>,
    Json(input): Json<CreateFieldInput>,
) -> impl IntoResponse {
    let service = FieldService::new(state.db.clone());

    match service.create_field(input).await {
        Ok(field) => (StatusCode::CREATED, Json(field)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a specific field
pub async fn get_field(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = FieldService::new(state.db.clone());

    match service.get_field(field_id).await {
        Ok(field) => (StatusCode::OK, Json(field)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a field's lifecycle event history, oldest first
pub async fn get_field_events(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = super::lifecycle_service(&state);

    match service.get_events(field_id).await {
        Ok(events) => (StatusCode::OK, Json(serde_json::json!({ "events": events }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a field's recent readings, newest first
pub async fn list_field_data(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
    Query(query): Query<FieldDataQuery>,
) -> impl IntoResponse {
    let service = FieldDataService::new(state.db.clone());
    let limit = query.limit.unwrap_or(state.config.lifecycle.data_window);

    match service.recent_window(field_id, limit).await {
        Ok(points) => (StatusCode::OK, Json(serde_json::json!({ "data": points }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Append a reading to a field's time series
pub async fn append_field_data(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
    Json(input): Json<AppendDataPointInput>,
) -> impl IntoResponse {
    let service = FieldDataService::new(state.db.clone());

    match service.append_point(field_id, input).await {
        Ok(written) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "written": written })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a field's cached satellite analysis
pub async fn get_field_analysis(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = CacheService::new(state.db.clone(), state.config.monitoring.cache_ttl_hours);

    match service.get_analysis(field_id).await {
        Ok(Some(cached)) => (StatusCode::OK, Json(cached)).into_response(),
        Ok(None) => AppError::NotFound("Field analysis".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}
