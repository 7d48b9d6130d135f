//! Detection cycle HTTP handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::services::MonitoringService;
use crate::AppState;

/// Run one detection cycle (cron-over-HTTP entry point)
pub async fn run_detection_cycle(State(state): State<AppState>) -> impl IntoResponse {
    let service = MonitoringService::new(state.db.clone(), state.config.clone());

    match service.run_detection_cycle().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Recompute current harvest candidates without mutating anything
pub async fn list_candidates(State(state): State<AppState>) -> impl IntoResponse {
    let service = MonitoringService::new(state.db.clone(), state.config.clone());

    match service.current_candidates().await {
        Ok(candidates) => (
            StatusCode::OK,
            Json(serde_json::json!({ "candidates": candidates })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
