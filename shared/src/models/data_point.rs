//! Per-field vegetation index readings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ratio used to derive NDRE from NDVI when the satellite payload omits it.
/// Downstream consumers rely on the derived value sitting below NDVI.
pub const NDRE_PROXY_RATIO: f64 = 0.85;

/// One satellite reading for a field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDataPoint {
    pub field_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub ndvi: f64,
    /// Measured NDRE; absent when the satellite pass did not include it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndre: Option<f64>,
}

impl FieldDataPoint {
    /// NDRE if measured, otherwise the NDVI-derived proxy.
    pub fn effective_ndre(&self) -> f64 {
        self.ndre.unwrap_or(self.ndvi * NDRE_PROXY_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(ndvi: f64, ndre: Option<f64>) -> FieldDataPoint {
        FieldDataPoint {
            field_id: Uuid::new_v4(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            ndvi,
            ndre,
        }
    }

    #[test]
    fn test_measured_ndre_wins() {
        assert_eq!(point(0.80, Some(0.55)).effective_ndre(), 0.55);
    }

    #[test]
    fn test_missing_ndre_derived_from_ndvi() {
        let derived = point(0.80, None).effective_ndre();
        assert!((derived - 0.68).abs() < 1e-12);
    }
}
