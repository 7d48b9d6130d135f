//! Lifecycle transition HTTP handlers
//!
//! Transition outcomes are booleans, not errors: a rejected guard is a benign
//! no-op the UI can retry after refreshing the field's status.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::services::lifecycle::{ConfirmHarvestInput, ReactivateFieldInput};
use crate::AppState;

fn applied(applied: bool) -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "applied": applied })))
}

/// Move a field to active
pub async fn activate_field(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = super::lifecycle_service(&state);

    match service.activate(field_id).await {
        Ok(result) => applied(result).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Confirm a detected harvest
pub async fn confirm_harvest(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
    Json(input): Json<ConfirmHarvestInput>,
) -> impl IntoResponse {
    let service = super::lifecycle_service(&state);

    match service.confirm_harvest(field_id, input).await {
        Ok(result) => applied(result).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Rest a harvested field
pub async fn transition_to_dormant(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = super::lifecycle_service(&state);

    match service.transition_to_dormant(field_id).await {
        Ok(result) => applied(result).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Re-arm a field under a new crop
pub async fn reactivate_field(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
    Json(input): Json<ReactivateFieldInput>,
) -> impl IntoResponse {
    let service = super::lifecycle_service(&state);

    match service.reactivate_field(field_id, input).await {
        Ok(result) => applied(result).into_response(),
        Err(e) => e.into_response(),
    }
}
