//! Field lifecycle state machine
//!
//! Owns every status transition: activate, confirm-harvest, go-dormant,
//! reactivate, plus the audit of first detection. Each successful transition
//! updates the field row and appends exactly one lifecycle event in the same
//! transaction. The status check is a compare-and-swap (`UPDATE … WHERE
//! status = expected`), so of two racing writers exactly one succeeds and the
//! other observes a benign `Ok(false)`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::cache::CacheService;
use shared::{
    replay, validate_crop_type, FieldStatus, HarvestCandidate, LifecycleConfig, LifecycleEvent,
    LifecycleEventType, LifecycleMetadata,
};

/// Lifecycle service executing guarded state transitions
#[derive(Clone)]
pub struct LifecycleService {
    db: PgPool,
    cache: CacheService,
    config: LifecycleConfig,
}

/// Metadata supplied by the farmer when confirming a harvest
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmHarvestInput {
    pub peak_ndvi: Option<f64>,
    pub peak_ndre: Option<f64>,
    pub previous_crop_yield: Option<Decimal>,
    pub notes: Option<String>,
}

/// Input for re-arming a field under a new crop
#[derive(Debug, Deserialize)]
pub struct ReactivateFieldInput {
    pub crop_type: String,
    pub reactivation_reason: Option<String>,
    pub notes: Option<String>,
}

/// Append one lifecycle event inside the caller's transaction
pub(crate) async fn append_event(
    tx: &mut Transaction<'_, Postgres>,
    field_id: Uuid,
    event_type: LifecycleEventType,
    from_status: Option<FieldStatus>,
    to_status: FieldStatus,
    metadata: &serde_json::Value,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO field_lifecycle_events (field_id, event_type, from_status, to_status, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(field_id)
    .bind(event_type.as_str())
    .bind(from_status.map(|s| s.as_str()))
    .bind(to_status.as_str())
    .bind(metadata)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn metadata_value(metadata: &LifecycleMetadata) -> AppResult<serde_json::Value> {
    serde_json::to_value(metadata).map_err(|e| AppError::Internal(e.to_string()))
}

impl LifecycleService {
    /// Create a new LifecycleService instance
    pub fn new(db: PgPool, cache: CacheService, config: LifecycleConfig) -> Self {
        Self { db, cache, config }
    }

    /// Current status and metadata of a field, or None if it does not exist
    async fn fetch_state(
        &self,
        field_id: Uuid,
    ) -> AppResult<Option<(FieldStatus, LifecycleMetadata)>> {
        let row = sqlx::query_as::<_, (String, serde_json::Value)>(
            "SELECT status, lifecycle_metadata FROM fields WHERE id = $1",
        )
        .bind(field_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            None => Ok(None),
            Some((status, metadata)) => {
                let status = FieldStatus::from_str(&status).ok_or_else(|| {
                    AppError::Internal(format!("Unknown field status '{}'", status))
                })?;
                let metadata = serde_json::from_value(metadata).unwrap_or_default();
                Ok(Some((status, metadata)))
            }
        }
    }

    /// Move a field to `active` from any prior status. Always permitted;
    /// false only for a missing field or a lost race.
    pub async fn activate(&self, field_id: Uuid) -> AppResult<bool> {
        let Some((from_status, current)) = self.fetch_state(field_id).await? else {
            tracing::warn!("activate: field {} does not exist", field_id);
            return Ok(false);
        };

        let delta = LifecycleMetadata::default();
        let merged = current.apply(LifecycleEventType::Activated, &delta);
        let event_metadata = metadata_value(&delta)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE fields
            SET status = $2, lifecycle_metadata = $3, updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(field_id)
        .bind(FieldStatus::Active.as_str())
        .bind(metadata_value(&merged)?)
        .bind(from_status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        append_event(
            &mut tx,
            field_id,
            LifecycleEventType::Activated,
            Some(from_status),
            FieldStatus::Active,
            &event_metadata,
        )
        .await?;

        tx.commit().await?;

        tracing::info!("Field {} activated (was {})", field_id, from_status);
        Ok(true)
    }

    /// Confirm a harvest: `active` → `harvested`.
    ///
    /// Stamps `harvest_confirmed_date` and the advisory `dormant_until` lock,
    /// moves `crop_type` to `last_crop_type`, and invalidates the analysis
    /// cache. A missing field or a field in any other status is a benign
    /// no-op reported as false.
    pub async fn confirm_harvest(
        &self,
        field_id: Uuid,
        input: ConfirmHarvestInput,
    ) -> AppResult<bool> {
        let Some((status, current)) = self.fetch_state(field_id).await? else {
            tracing::warn!("confirm_harvest: field {} does not exist", field_id);
            return Ok(false);
        };

        if status != FieldStatus::Active {
            tracing::debug!("confirm_harvest: field {} is {}, not active", field_id, status);
            return Ok(false);
        }

        let now = Utc::now();
        let delta = LifecycleMetadata {
            peak_ndvi: input.peak_ndvi,
            peak_ndre: input.peak_ndre,
            previous_crop_yield: input.previous_crop_yield,
            notes: input.notes,
            harvest_confirmed_date: Some(now),
            dormant_until: Some(now + Duration::days(self.config.dormant_lock_days)),
            ..Default::default()
        };
        let merged = current.apply(LifecycleEventType::HarvestConfirmed, &delta);
        let event_metadata = metadata_value(&delta)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE fields
            SET status = $2, last_crop_type = crop_type, crop_type = NULL,
                harvest_date = $3, lifecycle_metadata = $4, updated_at = NOW()
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(field_id)
        .bind(FieldStatus::Harvested.as_str())
        .bind(now)
        .bind(metadata_value(&merged)?)
        .bind(FieldStatus::Active.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Lost the race; the concurrent writer's transition stands
            tx.rollback().await?;
            return Ok(false);
        }

        append_event(
            &mut tx,
            field_id,
            LifecycleEventType::HarvestConfirmed,
            Some(FieldStatus::Active),
            FieldStatus::Harvested,
            &event_metadata,
        )
        .await?;

        tx.commit().await?;

        // The transition is committed; a stale cache entry only delays the
        // next fetch, so an invalidate failure must not mask the success.
        if let Err(e) = self.cache.invalidate(field_id).await {
            tracing::warn!("Field {} analysis cache not invalidated: {}", field_id, e);
        }

        tracing::info!("Field {} harvest confirmed, dormancy advised until {}", field_id, now + Duration::days(self.config.dormant_lock_days));
        Ok(true)
    }

    /// Rest a field: `harvested` → `dormant`.
    ///
    /// Guarded; any other current status is a benign no-op, since the sweep
    /// that schedules this call may race a reactivation.
    pub async fn transition_to_dormant(&self, field_id: Uuid) -> AppResult<bool> {
        let Some((status, current)) = self.fetch_state(field_id).await? else {
            tracing::warn!("transition_to_dormant: field {} does not exist", field_id);
            return Ok(false);
        };

        if status != FieldStatus::Harvested {
            tracing::debug!(
                "transition_to_dormant: field {} is {}, not harvested",
                field_id,
                status
            );
            return Ok(false);
        }

        let delta = LifecycleMetadata::default();
        let merged = current.apply(LifecycleEventType::Dormant, &delta);
        let event_metadata = metadata_value(&delta)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE fields
            SET status = $2, lifecycle_metadata = $3, updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(field_id)
        .bind(FieldStatus::Dormant.as_str())
        .bind(metadata_value(&merged)?)
        .bind(FieldStatus::Harvested.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        append_event(
            &mut tx,
            field_id,
            LifecycleEventType::Dormant,
            Some(FieldStatus::Harvested),
            FieldStatus::Dormant,
            &event_metadata,
        )
        .await?;

        tx.commit().await?;

        tracing::info!("Field {} transitioned to dormant", field_id);
        Ok(true)
    }

    /// Re-arm a field for monitoring under a new crop: any status → `active`.
    ///
    /// The dormancy lock is advisory: reactivating before `dormant_until`
    /// proceeds but is flagged as an override in the event metadata. Clears
    /// the analysis cache and the detection stamp of the finished crop cycle.
    pub async fn reactivate_field(
        &self,
        field_id: Uuid,
        input: ReactivateFieldInput,
    ) -> AppResult<bool> {
        validate_crop_type(&input.crop_type).map_err(|message| AppError::Validation {
            field: "crop_type".to_string(),
            message: message.to_string(),
        })?;

        let Some((from_status, current)) = self.fetch_state(field_id).await? else {
            tracing::warn!("reactivate_field: field {} does not exist", field_id);
            return Ok(false);
        };

        let now = Utc::now();
        let dormancy_override = current.dormant_until.map_or(false, |until| now < until);
        if dormancy_override {
            tracing::warn!(
                "Field {} reactivated inside its dormancy lock (until {:?})",
                field_id,
                current.dormant_until
            );
        }

        let delta = LifecycleMetadata {
            reactivation_reason: input.reactivation_reason,
            notes: input.notes,
            ..Default::default()
        };
        let merged = current.apply(LifecycleEventType::Reactivated, &delta);

        let mut event_metadata = metadata_value(&delta)?;
        if let Some(object) = event_metadata.as_object_mut() {
            object.insert("crop_type".to_string(), json!(input.crop_type));
            if dormancy_override {
                object.insert("dormancy_override".to_string(), json!(true));
            }
        }

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE fields
            SET status = $2, crop_type = $3, reactivation_date = $4,
                lifecycle_metadata = $5, updated_at = NOW()
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(field_id)
        .bind(FieldStatus::Active.as_str())
        .bind(input.crop_type.trim())
        .bind(now)
        .bind(metadata_value(&merged)?)
        .bind(from_status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        append_event(
            &mut tx,
            field_id,
            LifecycleEventType::Reactivated,
            Some(from_status),
            FieldStatus::Active,
            &event_metadata,
        )
        .await?;

        tx.commit().await?;

        if let Err(e) = self.cache.invalidate(field_id).await {
            tracing::warn!("Field {} analysis cache not invalidated: {}", field_id, e);
        }

        tracing::info!("Field {} reactivated (was {})", field_id, from_status);
        Ok(true)
    }

    /// Audit the first detection of a crop cycle: appends one
    /// `harvest_detected` event (`active` → `active`) and stamps
    /// `harvest_detection_date`. While the stamp is set, later runs still
    /// surface candidates but append nothing; returns false for those.
    pub async fn record_detection(&self, candidate: &HarvestCandidate) -> AppResult<bool> {
        let field_id = candidate.field_id;

        let Some((status, current)) = self.fetch_state(field_id).await? else {
            return Ok(false);
        };

        if status != FieldStatus::Active || current.harvest_detection_date.is_some() {
            return Ok(false);
        }

        let delta = LifecycleMetadata {
            peak_ndvi: Some(candidate.peak_ndvi),
            peak_ndre: Some(candidate.peak_ndre),
            harvest_detection_date: Some(candidate.detected_date),
            ..Default::default()
        };
        let merged = current.apply(LifecycleEventType::HarvestDetected, &delta);

        let mut event_metadata = metadata_value(&delta)?;
        if let Some(object) = event_metadata.as_object_mut() {
            object.insert("ndvi_drop_percent".to_string(), json!(candidate.ndvi_drop_percent));
            object.insert("ndre_drop_percent".to_string(), json!(candidate.ndre_drop_percent));
            object.insert("consecutive_days".to_string(), json!(candidate.consecutive_days));
            object.insert("confidence".to_string(), json!(candidate.confidence));
        }

        let mut tx = self.db.begin().await?;

        // The stamp is re-checked at write time: a concurrent cycle that read
        // the same unstamped state loses here instead of double-appending.
        let updated = sqlx::query(
            r#"
            UPDATE fields
            SET lifecycle_metadata = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
              AND lifecycle_metadata->>'harvest_detection_date' IS NULL
            "#,
        )
        .bind(field_id)
        .bind(metadata_value(&merged)?)
        .bind(FieldStatus::Active.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        append_event(
            &mut tx,
            field_id,
            LifecycleEventType::HarvestDetected,
            Some(FieldStatus::Active),
            FieldStatus::Active,
            &event_metadata,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Field {} harvest detected ({} confidence, NDVI drop {:.1}%)",
            field_id,
            candidate.confidence,
            candidate.ndvi_drop_percent
        );
        Ok(true)
    }

    /// A field's lifecycle events, oldest first
    pub async fn get_events(&self, field_id: Uuid) -> AppResult<Vec<LifecycleEvent>> {
        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                Uuid,
                String,
                Option<String>,
                String,
                serde_json::Value,
                DateTime<Utc>,
            ),
        >(
            r#"
            SELECT id, field_id, event_type, from_status, to_status, metadata, created_at
            FROM field_lifecycle_events
            WHERE field_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(field_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(
                |(id, field_id, event_type, from_status, to_status, metadata, created_at)| {
                    let event_type = LifecycleEventType::from_str(&event_type).ok_or_else(|| {
                        AppError::Internal(format!("Unknown event type '{}'", event_type))
                    })?;
                    let from_status = match from_status {
                        None => None,
                        Some(s) => Some(FieldStatus::from_str(&s).ok_or_else(|| {
                            AppError::Internal(format!("Unknown status '{}'", s))
                        })?),
                    };
                    let to_status = FieldStatus::from_str(&to_status).ok_or_else(|| {
                        AppError::Internal(format!("Unknown status '{}'", to_status))
                    })?;
                    Ok(LifecycleEvent {
                        id,
                        field_id,
                        event_type,
                        from_status,
                        to_status,
                        metadata,
                        created_at,
                    })
                },
            )
            .collect()
    }

    /// Rebuild one field's cached status and metadata from its event log.
    /// Returns true when a repair was needed.
    pub async fn reconcile_field(&self, field_id: Uuid) -> AppResult<bool> {
        let events = self.get_events(field_id).await?;
        let Some(expected) = replay(&events) else {
            return Ok(false);
        };

        let Some((status, metadata)) = self.fetch_state(field_id).await? else {
            return Ok(false);
        };

        if status == expected.status && metadata == expected.metadata {
            return Ok(false);
        }

        tracing::warn!(
            "Field {} cached status {} disagrees with event log ({}); repairing",
            field_id,
            status,
            expected.status
        );

        sqlx::query(
            r#"
            UPDATE fields
            SET status = $2, lifecycle_metadata = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(field_id)
        .bind(expected.status.as_str())
        .bind(metadata_value(&expected.metadata)?)
        .execute(&self.db)
        .await?;

        Ok(true)
    }

    /// Reconcile every field against its event log; returns repairs made
    pub async fn reconcile_all(&self) -> AppResult<u64> {
        let field_ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM fields ORDER BY created_at")
            .fetch_all(&self.db)
            .await?;

        let mut repaired = 0u64;
        for field_id in field_ids {
            if self.reconcile_field(field_id).await? {
                repaired += 1;
            }
        }

        Ok(repaired)
    }
}
