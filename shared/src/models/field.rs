//! Monitored field models and lifecycle metadata

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::LifecycleEventType;
use crate::types::GpsCoordinates;

/// Lifecycle status of a monitored field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// Crop growing, satellite data flowing
    Active,
    /// Crop removed, watched for rapid re-sow
    Harvested,
    /// Resting between crop cycles
    Dormant,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::Active => "active",
            FieldStatus::Harvested => "harvested",
            FieldStatus::Dormant => "dormant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(FieldStatus::Active),
            "harvested" => Some(FieldStatus::Harvested),
            "dormant" => Some(FieldStatus::Dormant),
            _ => None,
        }
    }

    /// Whether the poller should spend an external fetch on a field in this
    /// status. Only active fields consume satellite quota.
    pub fn should_fetch_data(&self) -> bool {
        matches!(self, FieldStatus::Active)
    }
}

impl std::fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured lifecycle metadata carried on a field.
///
/// Every transition merges a delta into this struct: `Some` fields overwrite,
/// `None` fields preserve what an earlier transition wrote. The same deltas
/// ride on the lifecycle events, so replaying a field's event list rebuilds
/// this struct exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleMetadata {
    pub schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_ndvi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_ndre: Option<f64>,
    /// Stamped once per crop cycle when the detector first fires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest_detection_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest_confirmed_date: Option<DateTime<Utc>>,
    /// Advisory rest period; reactivating before it elapses warns, never blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dormant_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactivation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_crop_yield: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for LifecycleMetadata {
    fn default() -> Self {
        Self {
            schema_version: Self::CURRENT_SCHEMA_VERSION,
            peak_ndvi: None,
            peak_ndre: None,
            harvest_detection_date: None,
            harvest_confirmed_date: None,
            dormant_until: None,
            reactivation_reason: None,
            previous_crop_yield: None,
            notes: None,
        }
    }
}

impl LifecycleMetadata {
    pub const CURRENT_SCHEMA_VERSION: u32 = 1;

    /// Merge a delta into this metadata: `Some` wins, `None` preserves.
    pub fn merge(&self, incoming: &LifecycleMetadata) -> LifecycleMetadata {
        LifecycleMetadata {
            schema_version: self.schema_version.max(incoming.schema_version),
            peak_ndvi: incoming.peak_ndvi.or(self.peak_ndvi),
            peak_ndre: incoming.peak_ndre.or(self.peak_ndre),
            harvest_detection_date: incoming
                .harvest_detection_date
                .or(self.harvest_detection_date),
            harvest_confirmed_date: incoming
                .harvest_confirmed_date
                .or(self.harvest_confirmed_date),
            dormant_until: incoming.dormant_until.or(self.dormant_until),
            reactivation_reason: incoming
                .reactivation_reason
                .clone()
                .or_else(|| self.reactivation_reason.clone()),
            previous_crop_yield: incoming.previous_crop_yield.or(self.previous_crop_yield),
            notes: incoming.notes.clone().or_else(|| self.notes.clone()),
        }
    }

    /// Apply one transition's delta. Reactivation also clears the detection
    /// stamp so the next crop cycle can detect again; plain merge cannot
    /// express a clear. Both the live transition path and event replay go
    /// through here.
    pub fn apply(
        &self,
        event_type: LifecycleEventType,
        delta: &LifecycleMetadata,
    ) -> LifecycleMetadata {
        let mut next = self.merge(delta);
        if event_type == LifecycleEventType::Reactivated {
            next.harvest_detection_date = None;
        }
        next
    }
}

/// A monitored plot of land
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub coordinates: Option<GpsCoordinates>,
    pub area_hectares: Option<Decimal>,
    pub status: FieldStatus,
    /// Crop currently in the ground; None between harvest and reactivation
    pub crop_type: Option<String>,
    /// Crop grown before the most recent harvest
    pub last_crop_type: Option<String>,
    pub harvest_date: Option<DateTime<Utc>>,
    pub reactivation_date: Option<DateTime<Utc>>,
    pub lifecycle_metadata: LifecycleMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
