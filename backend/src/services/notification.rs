//! In-app notifications for detection results
//!
//! Harvest candidates and rapid re-sow flags are surfaced here for human
//! confirmation; the UI answers by calling confirm-harvest or reactivate.
//! Dismissing a candidate notification is the rejection: the detector will
//! simply reproduce the candidate while conditions hold, but the lifecycle
//! audit stamp keeps duplicate events and notifications suppressed for the
//! rest of the crop cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{HarvestCandidate, RapidResowFlag};

/// Notification type labels stored on the row
const TYPE_HARVEST_CANDIDATE: &str = "harvest_candidate";
const TYPE_RAPID_RESOW: &str = "rapid_resow";

/// Notification service for detection results
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
}

/// One in-app notification row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FieldNotification {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub field_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub is_read: bool,
    pub is_dismissed: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationService {
    /// Create a new NotificationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Whether the field already has an open notification of this type
    async fn has_open_notification(
        &self,
        field_id: Uuid,
        notification_type: &str,
    ) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM field_notifications
                WHERE field_id = $1 AND notification_type = $2 AND is_dismissed = false
            )
            "#,
        )
        .bind(field_id)
        .bind(notification_type)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn insert(
        &self,
        owner_id: Uuid,
        field_id: Uuid,
        notification_type: &str,
        title: String,
        message: String,
        payload: serde_json::Value,
    ) -> AppResult<FieldNotification> {
        let notification = sqlx::query_as::<_, FieldNotification>(
            r#"
            INSERT INTO field_notifications (owner_id, field_id, notification_type, title, message, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, owner_id, field_id, notification_type, title, message, payload,
                      is_read, is_dismissed, created_at, read_at
            "#,
        )
        .bind(owner_id)
        .bind(field_id)
        .bind(notification_type)
        .bind(&title)
        .bind(&message)
        .bind(&payload)
        .fetch_one(&self.db)
        .await?;

        Ok(notification)
    }

    /// Surface a harvest candidate; skipped when one is already open
    pub async fn notify_harvest_candidate(
        &self,
        owner_id: Uuid,
        candidate: &HarvestCandidate,
    ) -> AppResult<Option<FieldNotification>> {
        if self
            .has_open_notification(candidate.field_id, TYPE_HARVEST_CANDIDATE)
            .await?
        {
            return Ok(None);
        }

        let title = format!("Harvest detected: {}", candidate.field_name);
        let message = format!(
            "NDVI dropped {:.1}% and NDRE {:.1}% from peak over {} consecutive days ({} confidence). Confirm the harvest or dismiss.",
            candidate.ndvi_drop_percent,
            candidate.ndre_drop_percent,
            candidate.consecutive_days,
            candidate.confidence
        );
        let payload =
            serde_json::to_value(candidate).map_err(|e| AppError::Internal(e.to_string()))?;

        let notification = self
            .insert(
                owner_id,
                candidate.field_id,
                TYPE_HARVEST_CANDIDATE,
                title,
                message,
                payload,
            )
            .await?;

        Ok(Some(notification))
    }

    /// Surface a rapid re-sow flag; skipped when one is already open
    pub async fn notify_rapid_resow(
        &self,
        owner_id: Uuid,
        flag: &RapidResowFlag,
    ) -> AppResult<Option<FieldNotification>> {
        if self
            .has_open_notification(flag.field_id, TYPE_RAPID_RESOW)
            .await?
        {
            return Ok(None);
        }

        let title = format!("Possible re-sow: {}", flag.field_name);
        let message = format!(
            "NDVI rose on {} of the last {} day-over-day readings since harvest. Reactivate the field with its new crop to resume monitoring.",
            flag.rising_pairs,
            flag.window_points.saturating_sub(1)
        );
        let payload = serde_json::to_value(flag).map_err(|e| AppError::Internal(e.to_string()))?;

        let notification = self
            .insert(owner_id, flag.field_id, TYPE_RAPID_RESOW, title, message, payload)
            .await?;

        Ok(Some(notification))
    }

    /// List notifications, optionally scoped to one owner or to unread only
    pub async fn list_notifications(
        &self,
        owner_id: Option<Uuid>,
        unread_only: bool,
        limit: i64,
    ) -> AppResult<Vec<FieldNotification>> {
        let notifications = sqlx::query_as::<_, FieldNotification>(
            r#"
            SELECT id, owner_id, field_id, notification_type, title, message, payload,
                   is_read, is_dismissed, created_at, read_at
            FROM field_notifications
            WHERE is_dismissed = false
              AND ($1::uuid IS NULL OR owner_id = $1)
              AND (NOT $2 OR is_read = false)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(owner_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(notifications)
    }

    /// Count unread notifications for an owner
    pub async fn unread_count(&self, owner_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM field_notifications
            WHERE owner_id = $1 AND is_read = false AND is_dismissed = false
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Mark a notification as read
    pub async fn mark_as_read(&self, notification_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE field_notifications
            SET is_read = true, read_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(notification_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification".to_string()));
        }

        Ok(())
    }

    /// Dismiss a notification. For a harvest candidate this is the rejection.
    pub async fn dismiss(&self, notification_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE field_notifications
            SET is_dismissed = true
            WHERE id = $1
            "#,
        )
        .bind(notification_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification".to_string()));
        }

        Ok(())
    }
}
