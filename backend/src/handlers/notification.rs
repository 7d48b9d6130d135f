//! Notification HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::services::NotificationService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UnreadCountQuery {
    pub owner_id: Uuid,
}

/// List open notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> impl IntoResponse {
    let service = NotificationService::new(state.db.clone());
    let limit = query.limit.unwrap_or(50);

    match service
        .list_notifications(query.owner_id, query.unread_only, limit)
        .await
    {
        Ok(notifications) => (
            StatusCode::OK,
            Json(serde_json::json!({ "notifications": notifications })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Count unread notifications for an owner
pub async fn unread_count(
    State(state): State<AppState>,
    Query(query): Query<UnreadCountQuery>,
) -> impl IntoResponse {
    let service = NotificationService::new(state.db.clone());

    match service.unread_count(query.owner_id).await {
        Ok(count) => (StatusCode::OK, Json(serde_json::json!({ "unread": count }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Mark a notification as read
pub async fn mark_as_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = NotificationService::new(state.db.clone());

    match service.mark_as_read(notification_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Dismiss a notification; for a harvest candidate this is the rejection
pub async fn dismiss_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = NotificationService::new(state.db.clone());

    match service.dismiss(notification_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
