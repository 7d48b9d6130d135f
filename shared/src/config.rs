//! Lifecycle tunables shared by the detector and the state machine

use serde::Deserialize;

/// Thresholds and windows driving harvest detection, rapid re-sow checks, and
/// dormancy scheduling. Constructed from the backend configuration and passed
/// in explicitly so tests can probe boundary values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Fraction of the window peak below which a reading counts as post-harvest
    pub harvest_threshold: f64,
    /// Consecutive newest readings that must sit below the threshold
    pub sustain_days: u32,
    /// Readings pulled into the detection window
    pub data_window: u32,
    /// Advisory rest period stamped at harvest confirmation
    pub dormant_lock_days: i64,
    /// How long after harvest a field stays watched for rapid re-sow
    pub rapid_resow_days: i64,
    /// Readings examined by the rapid re-sow check
    pub resow_window: u32,
    /// Rising day-over-day NDVI pairs required to flag a re-sow
    pub resow_min_rising: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            harvest_threshold: 0.60,
            sustain_days: 5,
            data_window: 30,
            dormant_lock_days: 21,
            rapid_resow_days: 14,
            resow_window: 7,
            resow_min_rising: 5,
        }
    }
}
