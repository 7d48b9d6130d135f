//! Field management service
//!
//! Creates monitored fields and reads them back. Creation writes the field
//! row plus its first lifecycle events (`created` then `activated`) in one
//! transaction, so a new field is born `active` with a replayable history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::lifecycle::append_event;
use shared::{
    validate_area_hectares, validate_coordinates, validate_crop_type, validate_field_name, Field,
    FieldStatus, GpsCoordinates, LifecycleEventType, LifecycleMetadata,
};

/// Field service for managing monitored plots
#[derive(Clone)]
pub struct FieldService {
    db: PgPool,
}

/// Database row for a field
#[derive(Debug, sqlx::FromRow)]
struct FieldRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
    area_hectares: Option<Decimal>,
    status: String,
    crop_type: Option<String>,
    last_crop_type: Option<String>,
    harvest_date: Option<DateTime<Utc>>,
    reactivation_date: Option<DateTime<Utc>>,
    lifecycle_metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FieldRow {
    fn into_field(self) -> AppResult<Field> {
        let status = FieldStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown field status '{}'", self.status)))?;
        let coordinates = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GpsCoordinates::new(latitude, longitude)),
            _ => None,
        };
        let lifecycle_metadata: LifecycleMetadata =
            serde_json::from_value(self.lifecycle_metadata).unwrap_or_default();

        Ok(Field {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            coordinates,
            area_hectares: self.area_hectares,
            status,
            crop_type: self.crop_type,
            last_crop_type: self.last_crop_type,
            harvest_date: self.harvest_date,
            reactivation_date: self.reactivation_date,
            lifecycle_metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const FIELD_COLUMNS: &str = r#"
    id, owner_id, name, latitude, longitude, area_hectares, status,
    crop_type, last_crop_type, harvest_date, reactivation_date,
    lifecycle_metadata, created_at, updated_at
"#;

/// Input for creating a field
#[derive(Debug, Deserialize)]
pub struct CreateFieldInput {
    pub owner_id: Uuid,
    pub name: String,
    pub crop_type: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub area_hectares: Option<Decimal>,
}

impl FieldService {
    /// Create a new FieldService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a field by ID
    pub async fn get_field(&self, field_id: Uuid) -> AppResult<Field> {
        let row = sqlx::query_as::<_, FieldRow>(&format!(
            "SELECT {} FROM fields WHERE id = $1",
            FIELD_COLUMNS
        ))
        .bind(field_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Field".to_string()))?;

        row.into_field()
    }

    /// List fields, optionally scoped to one owner
    pub async fn list_fields(&self, owner_id: Option<Uuid>) -> AppResult<Vec<Field>> {
        let rows = match owner_id {
            Some(owner_id) => {
                sqlx::query_as::<_, FieldRow>(&format!(
                    "SELECT {} FROM fields WHERE owner_id = $1 ORDER BY name ASC",
                    FIELD_COLUMNS
                ))
                .bind(owner_id)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, FieldRow>(&format!(
                    "SELECT {} FROM fields ORDER BY name ASC",
                    FIELD_COLUMNS
                ))
                .fetch_all(&self.db)
                .await?
            }
        };

        rows.into_iter().map(FieldRow::into_field).collect()
    }

    /// Create a new field, born `active` with a replayable event history
    pub async fn create_field(&self, input: CreateFieldInput) -> AppResult<Field> {
        validate_field_name(&input.name).map_err(|message| AppError::Validation {
            field: "name".to_string(),
            message: message.to_string(),
        })?;

        if let Some(ref crop_type) = input.crop_type {
            validate_crop_type(crop_type).map_err(|message| AppError::Validation {
                field: "crop_type".to_string(),
                message: message.to_string(),
            })?;
        }

        match (input.latitude, input.longitude) {
            (Some(latitude), Some(longitude)) => {
                validate_coordinates(latitude, longitude).map_err(|message| {
                    AppError::Validation {
                        field: "coordinates".to_string(),
                        message: message.to_string(),
                    }
                })?;
            }
            (None, None) => {}
            _ => {
                return Err(AppError::Validation {
                    field: "coordinates".to_string(),
                    message: "Latitude and longitude must be provided together".to_string(),
                });
            }
        }

        if let Some(area) = input.area_hectares {
            validate_area_hectares(area).map_err(|message| AppError::Validation {
                field: "area_hectares".to_string(),
                message: message.to_string(),
            })?;
        }

        // Check for duplicate name within the owner's fields
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM fields WHERE owner_id = $1 AND LOWER(name) = LOWER($2)",
        )
        .bind(input.owner_id)
        .bind(input.name.trim())
        .fetch_one(&self.db)
        .await?;

        if existing > 0 {
            return Err(AppError::Conflict {
                resource: "field".to_string(),
                message: "A field with this name already exists".to_string(),
            });
        }

        let metadata = LifecycleMetadata::default();
        let metadata_json =
            serde_json::to_value(&metadata).map_err(|e| AppError::Internal(e.to_string()))?;

        let mut tx = self.db.begin().await?;

        let field_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO fields (owner_id, name, latitude, longitude, area_hectares,
                                status, crop_type, lifecycle_metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(input.owner_id)
        .bind(input.name.trim())
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.area_hectares)
        .bind(FieldStatus::Active.as_str())
        .bind(input.crop_type.as_deref().map(str::trim))
        .bind(&metadata_json)
        .fetch_one(&mut *tx)
        .await?;

        append_event(
            &mut tx,
            field_id,
            LifecycleEventType::Created,
            None,
            FieldStatus::Active,
            &metadata_json,
        )
        .await?;

        append_event(
            &mut tx,
            field_id,
            LifecycleEventType::Activated,
            Some(FieldStatus::Active),
            FieldStatus::Active,
            &metadata_json,
        )
        .await?;

        tx.commit().await?;

        tracing::info!("Field {} created for owner {}", field_id, input.owner_id);

        self.get_field(field_id).await
    }
}
