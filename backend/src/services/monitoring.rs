//! Monitoring-set selection and the periodic detection cycle
//!
//! The cycle fans out one unit of work per field with bounded concurrency and
//! a per-field timeout; a failed or stalled field is logged and skipped, never
//! retried in-loop, so one bad field cannot stall the batch. Inability to read
//! the monitoring set at all halts the cycle with an error.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::satellite::SatelliteClient;
use crate::services::cache::CacheService;
use crate::services::field_data::FieldDataService;
use crate::services::lifecycle::LifecycleService;
use crate::services::notification::NotificationService;
use shared::{FieldStatus, HarvestCandidate, HarvestDetector, RapidResowFlag};

/// Monitoring and detection-cycle service
#[derive(Clone)]
pub struct MonitoringService {
    db: PgPool,
    config: Arc<Config>,
    satellite: Option<SatelliteClient>,
    field_data: FieldDataService,
    lifecycle: LifecycleService,
    cache: CacheService,
    notifications: NotificationService,
}

/// A field selected for this cycle
#[derive(Debug, Clone)]
pub struct MonitoredField {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: FieldStatus,
    pub harvest_date: Option<DateTime<Utc>>,
}

/// Summary of one detection cycle
#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    pub fields_processed: u32,
    pub points_fetched: u64,
    pub candidates: Vec<HarvestCandidate>,
    pub resow_flags: Vec<RapidResowFlag>,
    pub dormant_transitions: u32,
    pub failed_fields: u32,
}

/// Result of one field's unit of work
#[derive(Debug, Default)]
struct FieldOutcome {
    points_fetched: u64,
    candidate: Option<HarvestCandidate>,
    resow: Option<RapidResowFlag>,
}

impl MonitoringService {
    /// Create a new MonitoringService instance. An empty satellite API key
    /// disables external fetches; detection still runs over stored readings.
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        let satellite = if config.satellite.api_key.is_empty() {
            None
        } else {
            Some(SatelliteClient::new(
                config.satellite.api_key.clone(),
                config.satellite.api_endpoint.clone(),
            ))
        };
        let cache = CacheService::new(db.clone(), config.monitoring.cache_ttl_hours);
        let lifecycle =
            LifecycleService::new(db.clone(), cache.clone(), config.lifecycle.clone());

        Self {
            field_data: FieldDataService::new(db.clone()),
            notifications: NotificationService::new(db.clone()),
            db,
            config,
            satellite,
            lifecycle,
            cache,
        }
    }

    /// Fields worth polling this cycle: every `active` field, plus `harvested`
    /// fields still inside the rapid re-sow watch window. Dormant fields and
    /// harvested fields past the window are excluded entirely.
    pub async fn monitoring_set(&self) -> AppResult<Vec<MonitoredField>> {
        let cutoff = Utc::now() - Duration::days(self.config.lifecycle.rapid_resow_days);

        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String, Option<DateTime<Utc>>)>(
            r#"
            SELECT id, owner_id, name, status, harvest_date
            FROM fields
            WHERE status = $1
               OR (status = $2 AND harvest_date IS NOT NULL AND harvest_date >= $3)
            ORDER BY name ASC
            "#,
        )
        .bind(FieldStatus::Active.as_str())
        .bind(FieldStatus::Harvested.as_str())
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(id, owner_id, name, status, harvest_date)| {
                let status = FieldStatus::from_str(&status).ok_or_else(|| {
                    AppError::Internal(format!("Unknown field status '{}'", status))
                })?;
                Ok(MonitoredField {
                    id,
                    owner_id,
                    name,
                    status,
                    harvest_date,
                })
            })
            .collect()
    }

    /// Run one idempotent detection cycle over the monitoring set
    pub async fn run_detection_cycle(&self) -> AppResult<CycleReport> {
        let fields = self.monitoring_set().await?;
        tracing::info!("Detection cycle started over {} fields", fields.len());

        let mut report = CycleReport::default();
        let semaphore = Arc::new(Semaphore::new(self.config.monitoring.max_concurrent_fields));
        let field_timeout = StdDuration::from_secs(self.config.monitoring.field_timeout_secs);

        let mut join_set = JoinSet::new();
        for field in fields {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = timeout(field_timeout, service.process_field(&field)).await;
                (field, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(Ok(outcome)))) => {
                    report.fields_processed += 1;
                    report.points_fetched += outcome.points_fetched;
                    if let Some(candidate) = outcome.candidate {
                        report.candidates.push(candidate);
                    }
                    if let Some(flag) = outcome.resow {
                        report.resow_flags.push(flag);
                    }
                }
                Ok((field, Ok(Err(e)))) => {
                    tracing::warn!("Field {} skipped this cycle: {}", field.id, e);
                    report.failed_fields += 1;
                }
                Ok((field, Err(_))) => {
                    tracing::warn!(
                        "Field {} timed out after {}s; retrying next cycle",
                        field.id,
                        self.config.monitoring.field_timeout_secs
                    );
                    report.failed_fields += 1;
                }
                Err(join_error) => {
                    tracing::warn!("Field task failed to complete: {}", join_error);
                    report.failed_fields += 1;
                }
            }
        }

        report.dormant_transitions = self.sweep_dormant().await?;

        tracing::info!(
            "Detection cycle finished: {} fields, {} points, {} candidates, {} re-sow flags, {} dormant, {} failed",
            report.fields_processed,
            report.points_fetched,
            report.candidates.len(),
            report.resow_flags.len(),
            report.dormant_transitions,
            report.failed_fields
        );

        Ok(report)
    }

    /// One field's unit of work: fetch fresh readings when allowed, then run
    /// the detector appropriate to the field's status.
    async fn process_field(&self, field: &MonitoredField) -> AppResult<FieldOutcome> {
        let mut outcome = FieldOutcome::default();
        let mut fetched_fresh = false;

        // shouldFetchData: only active fields consume satellite quota
        if field.status.should_fetch_data() {
            if let Some(client) = &self.satellite {
                if self.cache.is_fetch_allowed(field.id).await? {
                    let readings = client
                        .get_recent_readings(field.id, self.config.lifecycle.data_window)
                        .await?;
                    outcome.points_fetched =
                        self.field_data.ingest_readings(field.id, &readings).await?;
                    fetched_fresh = true;
                }
            }
        }

        let window = self
            .field_data
            .recent_window(field.id, self.config.lifecycle.data_window)
            .await?;
        let detector = HarvestDetector::new(self.config.lifecycle.clone());

        match field.status {
            FieldStatus::Active => {
                if fetched_fresh {
                    if let Some(latest) = window.first() {
                        let peak_ndvi =
                            window.iter().map(|p| p.ndvi).fold(f64::MIN, f64::max);
                        let analysis = serde_json::json!({
                            "latest_ndvi": latest.ndvi,
                            "latest_ndre": latest.effective_ndre(),
                            "peak_ndvi": peak_ndvi,
                            "window_points": window.len(),
                            "as_of": latest.timestamp,
                        });
                        self.cache.store_analysis(field.id, analysis).await?;
                    }
                }

                if let Some(candidate) = detector.evaluate(field.id, &field.name, &window) {
                    let newly_detected = self.lifecycle.record_detection(&candidate).await?;
                    if newly_detected {
                        self.notifications
                            .notify_harvest_candidate(field.owner_id, &candidate)
                            .await?;
                    }
                    outcome.candidate = Some(candidate);
                }
            }
            FieldStatus::Harvested => {
                if detector.is_rapid_resow(&window) {
                    let flag = RapidResowFlag {
                        field_id: field.id,
                        field_name: field.name.clone(),
                        rising_pairs: detector.rising_pairs(&window).unwrap_or(0),
                        window_points: self.config.lifecycle.resow_window,
                        flagged_date: Utc::now(),
                    };
                    self.notifications
                        .notify_rapid_resow(field.owner_id, &flag)
                        .await?;
                    outcome.resow = Some(flag);
                }
            }
            // Dormant fields are never in the monitoring set
            FieldStatus::Dormant => {}
        }

        Ok(outcome)
    }

    /// Move harvested fields past the rapid re-sow window to dormant.
    /// The guarded transition tolerates racing reactivations.
    async fn sweep_dormant(&self) -> AppResult<u32> {
        let cutoff = Utc::now() - Duration::days(self.config.lifecycle.rapid_resow_days);

        let field_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM fields
            WHERE status = $1 AND harvest_date IS NOT NULL AND harvest_date < $2
            "#,
        )
        .bind(FieldStatus::Harvested.as_str())
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        let mut transitions = 0u32;
        for field_id in field_ids {
            if self.lifecycle.transition_to_dormant(field_id).await? {
                transitions += 1;
            }
        }

        Ok(transitions)
    }

    /// Recompute current candidates without mutating anything. Re-running
    /// reproduces the same candidates while conditions hold.
    pub async fn current_candidates(&self) -> AppResult<Vec<HarvestCandidate>> {
        let detector = HarvestDetector::new(self.config.lifecycle.clone());
        let mut candidates = Vec::new();

        for field in self.monitoring_set().await? {
            if field.status != FieldStatus::Active {
                continue;
            }
            let window = self
                .field_data
                .recent_window(field.id, self.config.lifecycle.data_window)
                .await?;
            if let Some(candidate) = detector.evaluate(field.id, &field.name, &window) {
                candidates.push(candidate);
            }
        }

        Ok(candidates)
    }
}
