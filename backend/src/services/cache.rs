//! Field analysis cache with a fixed TTL
//!
//! Holds the latest derived satellite analysis per field for fast UI reads.
//! The lifecycle state machine invalidates entries on harvest confirmation
//! and reactivation; the poller consults `is_fetch_allowed` before spending
//! an external fetch.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppResult;

/// Cache service keyed by field id
#[derive(Clone)]
pub struct CacheService {
    db: PgPool,
    ttl: Duration,
}

/// Cached analysis entry
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CachedAnalysis {
    pub field_id: Uuid,
    pub analysis: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheService {
    /// Create a new CacheService instance
    pub fn new(db: PgPool, ttl_hours: i64) -> Self {
        Self {
            db,
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Remove a field's cache entry so the next poll fetches fresh data
    pub async fn invalidate(&self, field_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM field_analysis_cache WHERE field_id = $1")
            .bind(field_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Whether the poller may spend an external fetch on this field.
    /// False while an unexpired entry exists.
    pub async fn is_fetch_allowed(&self, field_id: Uuid) -> AppResult<bool> {
        let fresh = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM field_analysis_cache
                WHERE field_id = $1 AND expires_at > NOW()
            )
            "#,
        )
        .bind(field_id)
        .fetch_one(&self.db)
        .await?;

        Ok(!fresh)
    }

    /// Store the latest analysis for a field, replacing any prior entry
    pub async fn store_analysis(
        &self,
        field_id: Uuid,
        analysis: serde_json::Value,
    ) -> AppResult<CachedAnalysis> {
        let expires_at = Utc::now() + self.ttl;

        let cached = sqlx::query_as::<_, CachedAnalysis>(
            r#"
            INSERT INTO field_analysis_cache (field_id, analysis, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (field_id)
            DO UPDATE SET analysis = $2, fetched_at = NOW(), expires_at = $3
            RETURNING field_id, analysis, fetched_at, expires_at
            "#,
        )
        .bind(field_id)
        .bind(&analysis)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await?;

        Ok(cached)
    }

    /// Get a field's cached analysis if not expired
    pub async fn get_analysis(&self, field_id: Uuid) -> AppResult<Option<CachedAnalysis>> {
        let cached = sqlx::query_as::<_, CachedAnalysis>(
            r#"
            SELECT field_id, analysis, fetched_at, expires_at
            FROM field_analysis_cache
            WHERE field_id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(field_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(cached)
    }
}
