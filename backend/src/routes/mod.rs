//! Route definitions for the Field Lifecycle Management Service

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Field management
        .nest("/fields", field_routes())
        // Detection cycle
        .nest("/detection", detection_routes())
        // Notification management
        .nest("/notifications", notification_routes())
}

/// Field management and lifecycle routes
fn field_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_fields).post(handlers::create_field))
        .route("/:field_id", get(handlers::get_field))
        .route("/:field_id/events", get(handlers::get_field_events))
        .route(
            "/:field_id/data",
            get(handlers::list_field_data).post(handlers::append_field_data),
        )
        .route("/:field_id/analysis", get(handlers::get_field_analysis))
        .route("/:field_id/activate", post(handlers::activate_field))
        .route("/:field_id/confirm-harvest", post(handlers::confirm_harvest))
        .route("/:field_id/dormant", post(handlers::transition_to_dormant))
        .route("/:field_id/reactivate", post(handlers::reactivate_field))
}

/// Detection cycle routes
fn detection_routes() -> Router<AppState> {
    Router::new()
        .route("/run", post(handlers::run_detection_cycle))
        .route("/candidates", get(handlers::list_candidates))
}

/// Notification routes
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/unread-count", get(handlers::unread_count))
        .route("/:notification_id/read", post(handlers::mark_as_read))
        .route(
            "/:notification_id/dismiss",
            post(handlers::dismiss_notification),
        )
}
