//! Harvest candidates produced by the detector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidence tier assigned to a harvest candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    /// High needs both drops strictly above 50%, low fires when either drop
    /// sits strictly below 35%, everything else is medium. Exact boundary
    /// values land on medium.
    pub fn classify(ndvi_drop_percent: f64, ndre_drop_percent: f64) -> Self {
        if ndvi_drop_percent > 50.0 && ndre_drop_percent > 50.0 {
            Confidence::High
        } else if ndvi_drop_percent < 35.0 || ndre_drop_percent < 35.0 {
            Confidence::Low
        } else {
            Confidence::Medium
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field the detector believes was recently harvested.
///
/// Candidates are recomputed on every detection run and never stored; the
/// durable trace is the `harvest_detected` lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestCandidate {
    pub field_id: Uuid,
    pub field_name: String,
    pub current_ndvi: f64,
    pub current_ndre: f64,
    pub peak_ndvi: f64,
    pub peak_ndre: f64,
    pub ndvi_drop_percent: f64,
    pub ndre_drop_percent: f64,
    pub consecutive_days: u32,
    pub detected_date: DateTime<Utc>,
    pub confidence: Confidence,
}

/// A recently harvested field whose NDVI is climbing again
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidResowFlag {
    pub field_id: Uuid,
    pub field_name: String,
    pub rising_pairs: u32,
    pub window_points: u32,
    pub flagged_date: DateTime<Utc>,
}
