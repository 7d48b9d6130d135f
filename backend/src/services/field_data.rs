//! Append-only store of per-field vegetation readings

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::satellite::VegetationReading;
use shared::{validate_index_value, FieldDataPoint};

/// Field data service managing the reading time series
#[derive(Clone)]
pub struct FieldDataService {
    db: PgPool,
}

/// Input for appending a reading by hand (testing rigs, backfills)
#[derive(Debug, Deserialize)]
pub struct AppendDataPointInput {
    pub timestamp: Option<DateTime<Utc>>,
    pub ndvi: f64,
    pub ndre: Option<f64>,
}

impl FieldDataService {
    /// Create a new FieldDataService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append a single reading. Re-appending the same (field, timestamp) is
    /// an idempotent no-op; returns whether a row was written.
    pub async fn append_point(
        &self,
        field_id: Uuid,
        input: AppendDataPointInput,
    ) -> AppResult<bool> {
        validate_index_value(input.ndvi).map_err(|message| AppError::Validation {
            field: "ndvi".to_string(),
            message: message.to_string(),
        })?;
        if let Some(ndre) = input.ndre {
            validate_index_value(ndre).map_err(|message| AppError::Validation {
                field: "ndre".to_string(),
                message: message.to_string(),
            })?;
        }

        let timestamp = input.timestamp.unwrap_or_else(Utc::now);

        let result = sqlx::query(
            r#"
            INSERT INTO field_data (field_id, timestamp, ndvi, ndre)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (field_id, timestamp) DO NOTHING
            "#,
        )
        .bind(field_id)
        .bind(timestamp)
        .bind(input.ndvi)
        .bind(input.ndre)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Ingest a batch of satellite readings for a field.
    /// Returns the number of rows actually written.
    pub async fn ingest_readings(
        &self,
        field_id: Uuid,
        readings: &[VegetationReading],
    ) -> AppResult<u64> {
        let mut written = 0u64;
        let mut tx = self.db.begin().await?;

        for reading in readings {
            if validate_index_value(reading.ndvi).is_err() {
                tracing::warn!(
                    "Skipping out-of-range NDVI {} for field {}",
                    reading.ndvi,
                    field_id
                );
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO field_data (field_id, timestamp, ndvi, ndre)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (field_id, timestamp) DO NOTHING
                "#,
            )
            .bind(field_id)
            .bind(reading.timestamp)
            .bind(reading.ndvi)
            .bind(reading.ndre)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;

        Ok(written)
    }

    /// Most recent readings for a field, newest first, the order every
    /// window-based consumer expects.
    pub async fn recent_window(&self, field_id: Uuid, limit: u32) -> AppResult<Vec<FieldDataPoint>> {
        let rows = sqlx::query_as::<_, (Uuid, DateTime<Utc>, f64, Option<f64>)>(
            r#"
            SELECT field_id, timestamp, ndvi, ndre
            FROM field_data
            WHERE field_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(field_id)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(field_id, timestamp, ndvi, ndre)| FieldDataPoint {
                field_id,
                timestamp,
                ndvi,
                ndre,
            })
            .collect())
    }
}
