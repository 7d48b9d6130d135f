//! Harvest and rapid re-sow detection over vegetation index windows

use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::models::{Confidence, FieldDataPoint, HarvestCandidate};

/// Pure detector over a field's recent readings.
///
/// Readings are always passed newest first, the order the data layer returns
/// them. The detector never touches storage; the caller decides what to do
/// with a candidate.
#[derive(Debug, Clone)]
pub struct HarvestDetector {
    config: LifecycleConfig,
}

impl HarvestDetector {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Evaluate one field's recent window for a sustained post-harvest drop.
    ///
    /// A candidate is produced only when every one of the newest
    /// `sustain_days` readings sits at or below `harvest_threshold` of the
    /// window peak on both NDVI and NDRE. One day of recovery in either index
    /// disqualifies the field. Fewer readings than `sustain_days` means
    /// insufficient history, not an error.
    pub fn evaluate(
        &self,
        field_id: Uuid,
        field_name: &str,
        readings: &[FieldDataPoint],
    ) -> Option<HarvestCandidate> {
        let sustain = self.config.sustain_days as usize;
        if sustain == 0 || readings.len() < sustain {
            return None;
        }

        let window_len = readings.len().min(self.config.data_window as usize);
        let window = &readings[..window_len];

        let peak_ndvi = window.iter().map(|p| p.ndvi).fold(f64::MIN, f64::max);
        let peak_ndre = window
            .iter()
            .map(|p| p.effective_ndre())
            .fold(f64::MIN, f64::max);
        // A window that never saw growth has nothing to drop from
        if peak_ndvi <= 0.0 || peak_ndre <= 0.0 {
            return None;
        }

        let ndvi_limit = peak_ndvi * self.config.harvest_threshold;
        let ndre_limit = peak_ndre * self.config.harvest_threshold;
        let sustained = window[..sustain]
            .iter()
            .all(|p| p.ndvi <= ndvi_limit && p.effective_ndre() <= ndre_limit);
        if !sustained {
            return None;
        }

        let current = &window[0];
        let current_ndre = current.effective_ndre();
        let ndvi_drop_percent = (1.0 - current.ndvi / peak_ndvi) * 100.0;
        let ndre_drop_percent = (1.0 - current_ndre / peak_ndre) * 100.0;

        Some(HarvestCandidate {
            field_id,
            field_name: field_name.to_string(),
            current_ndvi: current.ndvi,
            current_ndre,
            peak_ndvi,
            peak_ndre,
            ndvi_drop_percent,
            ndre_drop_percent,
            consecutive_days: self.config.sustain_days,
            detected_date: current.timestamp,
            confidence: Confidence::classify(ndvi_drop_percent, ndre_drop_percent),
        })
    }

    /// Count day-over-day NDVI pairs that are rising toward the present.
    /// Returns `None` when fewer than `resow_window` readings exist.
    pub fn rising_pairs(&self, readings: &[FieldDataPoint]) -> Option<u32> {
        let window = self.config.resow_window as usize;
        if window < 2 || readings.len() < window {
            return None;
        }
        let count = readings[..window]
            .windows(2)
            .filter(|pair| pair[0].ndvi > pair[1].ndvi)
            .count();
        Some(count as u32)
    }

    /// Whether a recently harvested field looks re-sown: at least
    /// `resow_min_rising` of the rising pairs in the re-sow window.
    pub fn is_rapid_resow(&self, readings: &[FieldDataPoint]) -> bool {
        self.rising_pairs(readings)
            .map_or(false, |count| count >= self.config.resow_min_rising)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 10, 0, 0).unwrap()
    }

    /// Build readings newest first, one per day, NDRE left to the proxy
    fn series(field_id: Uuid, values: &[f64]) -> Vec<FieldDataPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &ndvi)| FieldDataPoint {
                field_id,
                timestamp: base_time() - Duration::days(i as i64),
                ndvi,
                ndre: None,
            })
            .collect()
    }

    /// Thirty days of healthy growth peaking at 0.80, then five post-harvest days
    fn harvested_series(field_id: Uuid) -> Vec<FieldDataPoint> {
        let mut values = vec![0.20, 0.22, 0.19, 0.21, 0.20];
        values.extend(std::iter::repeat(0.80).take(25));
        series(field_id, &values)
    }

    fn detector() -> HarvestDetector {
        HarvestDetector::new(LifecycleConfig::default())
    }

    // ========================================================================
    // Harvest detection
    // ========================================================================

    #[test]
    fn test_detects_sustained_drop_with_high_confidence() {
        let field_id = Uuid::new_v4();
        let candidate = detector()
            .evaluate(field_id, "north paddock", &harvested_series(field_id))
            .unwrap();

        assert_eq!(candidate.field_id, field_id);
        assert_eq!(candidate.peak_ndvi, 0.80);
        assert_eq!(candidate.current_ndvi, 0.20);
        assert!((candidate.ndvi_drop_percent - 75.0).abs() < 1e-9);
        assert!((candidate.ndre_drop_percent - 75.0).abs() < 1e-9);
        assert_eq!(candidate.consecutive_days, 5);
        assert_eq!(candidate.confidence, Confidence::High);
        assert_eq!(candidate.detected_date, base_time());
    }

    #[test]
    fn test_insufficient_history_is_skipped() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.20, 0.21, 0.19, 0.20]);
        assert!(detector().evaluate(field_id, "f", &readings).is_none());
    }

    #[test]
    fn test_single_ndvi_recovery_day_suppresses() {
        let field_id = Uuid::new_v4();
        for recovered_day in 0..5 {
            let mut readings = harvested_series(field_id);
            // 0.49 is just above the 0.80 * 0.60 = 0.48 limit
            readings[recovered_day].ndvi = 0.49;
            assert!(
                detector().evaluate(field_id, "f", &readings).is_none(),
                "recovery on day {} should suppress the candidate",
                recovered_day
            );
        }
    }

    #[test]
    fn test_single_ndre_recovery_day_suppresses() {
        let field_id = Uuid::new_v4();
        for recovered_day in 0..5 {
            let mut readings = harvested_series(field_id);
            // NDVI stays post-harvest; measured NDRE pops above 0.68 * 0.60
            readings[recovered_day].ndre = Some(0.60);
            assert!(
                detector().evaluate(field_id, "f", &readings).is_none(),
                "NDRE recovery on day {} should suppress the candidate",
                recovered_day
            );
        }
    }

    #[test]
    fn test_reading_at_exact_threshold_still_counts() {
        let field_id = Uuid::new_v4();
        let mut values = vec![0.48; 5];
        values.extend(std::iter::repeat(0.80).take(25));
        let candidate = detector()
            .evaluate(field_id, "f", &series(field_id, &values))
            .unwrap();
        assert!((candidate.ndvi_drop_percent - 40.0).abs() < 1e-9);
        assert_eq!(candidate.confidence, Confidence::Medium);
    }

    #[test]
    fn test_derived_ndre_behaves_like_explicit_proxy() {
        let field_id = Uuid::new_v4();
        let derived = harvested_series(field_id);
        let explicit: Vec<FieldDataPoint> = derived
            .iter()
            .map(|p| FieldDataPoint {
                ndre: Some(p.ndvi * 0.85),
                ..p.clone()
            })
            .collect();

        let from_derived = detector().evaluate(field_id, "f", &derived).unwrap();
        let from_explicit = detector().evaluate(field_id, "f", &explicit).unwrap();
        assert_eq!(from_derived.current_ndre, from_explicit.current_ndre);
        assert_eq!(from_derived.peak_ndre, from_explicit.peak_ndre);
        assert_eq!(from_derived.ndre_drop_percent, from_explicit.ndre_drop_percent);
        assert_eq!(from_derived.confidence, from_explicit.confidence);
    }

    #[test]
    fn test_peak_is_taken_over_the_window_only() {
        let field_id = Uuid::new_v4();
        // A 0.95 spike sits past the 30-reading window and must not count
        let mut values = vec![0.20; 5];
        values.extend(std::iter::repeat(0.50).take(25));
        values.extend(std::iter::repeat(0.95).take(5));
        let candidate = detector()
            .evaluate(field_id, "f", &series(field_id, &values))
            .unwrap();
        assert_eq!(candidate.peak_ndvi, 0.50);
        assert!((candidate.ndvi_drop_percent - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_candidate_when_window_never_grew() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.0, -0.05, 0.0, -0.1, 0.0, -0.02]);
        assert!(detector().evaluate(field_id, "f", &readings).is_none());
    }

    #[test]
    fn test_healthy_field_produces_no_candidate() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.78; 30]);
        assert!(detector().evaluate(field_id, "f", &readings).is_none());
    }

    #[test]
    fn test_custom_thresholds_are_respected() {
        let field_id = Uuid::new_v4();
        let config = LifecycleConfig {
            harvest_threshold: 0.50,
            sustain_days: 3,
            ..Default::default()
        };
        let det = HarvestDetector::new(config);
        // 0.42 is below 0.80 * 0.60 but above 0.80 * 0.50
        let mut values = vec![0.42; 3];
        values.extend(std::iter::repeat(0.80).take(10));
        assert!(det.evaluate(field_id, "f", &series(field_id, &values)).is_none());

        let mut values = vec![0.39; 3];
        values.extend(std::iter::repeat(0.80).take(10));
        assert!(det.evaluate(field_id, "f", &series(field_id, &values)).is_some());
    }

    // ========================================================================
    // Rapid re-sow
    // ========================================================================

    #[test]
    fn test_resow_flags_steady_recovery() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.40, 0.35, 0.30, 0.25, 0.20, 0.15, 0.10]);
        assert_eq!(detector().rising_pairs(&readings), Some(6));
        assert!(detector().is_rapid_resow(&readings));
    }

    #[test]
    fn test_resow_accepts_five_of_six_rising_pairs() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.40, 0.35, 0.30, 0.32, 0.25, 0.20, 0.15]);
        assert_eq!(detector().rising_pairs(&readings), Some(5));
        assert!(detector().is_rapid_resow(&readings));
    }

    #[test]
    fn test_resow_rejects_four_rising_pairs() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.40, 0.35, 0.36, 0.32, 0.33, 0.20, 0.15]);
        assert_eq!(detector().rising_pairs(&readings), Some(4));
        assert!(!detector().is_rapid_resow(&readings));
    }

    #[test]
    fn test_resow_requires_full_window() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.40, 0.35, 0.30, 0.25, 0.20, 0.15]);
        assert_eq!(detector().rising_pairs(&readings), None);
        assert!(!detector().is_rapid_resow(&readings));
    }

    #[test]
    fn test_resow_ignores_flat_series() {
        let field_id = Uuid::new_v4();
        let readings = series(field_id, &[0.25; 7]);
        assert_eq!(detector().rising_pairs(&readings), Some(0));
        assert!(!detector().is_rapid_resow(&readings));
    }

    // ========================================================================
    // Properties
    // ========================================================================

    proptest! {
        #[test]
        fn prop_candidate_is_internally_consistent(
            values in prop::collection::vec(0.01f64..0.95, 5..40)
        ) {
            let field_id = Uuid::new_v4();
            let readings = series(field_id, &values);
            if let Some(c) = detector().evaluate(field_id, "f", &readings) {
                prop_assert!(c.peak_ndvi >= c.current_ndvi);
                prop_assert!(c.peak_ndre >= c.current_ndre);
                let expected = (1.0 - c.current_ndvi / c.peak_ndvi) * 100.0;
                prop_assert!((c.ndvi_drop_percent - expected).abs() < 1e-9);
                prop_assert_eq!(
                    c.confidence,
                    Confidence::classify(c.ndvi_drop_percent, c.ndre_drop_percent)
                );
            }
        }

        #[test]
        fn prop_short_history_never_detects(
            values in prop::collection::vec(0.0f64..1.0, 0..5)
        ) {
            let field_id = Uuid::new_v4();
            let readings = series(field_id, &values);
            prop_assert!(detector().evaluate(field_id, "f", &readings).is_none());
        }
    }
}
