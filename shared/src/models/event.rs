//! Lifecycle audit events and replay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::field::{FieldStatus, LifecycleMetadata};

/// Kind of lifecycle transition recorded for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    Created,
    Activated,
    HarvestDetected,
    HarvestConfirmed,
    Dormant,
    Reactivated,
}

impl LifecycleEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEventType::Created => "created",
            LifecycleEventType::Activated => "activated",
            LifecycleEventType::HarvestDetected => "harvest_detected",
            LifecycleEventType::HarvestConfirmed => "harvest_confirmed",
            LifecycleEventType::Dormant => "dormant",
            LifecycleEventType::Reactivated => "reactivated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(LifecycleEventType::Created),
            "activated" => Some(LifecycleEventType::Activated),
            "harvest_detected" => Some(LifecycleEventType::HarvestDetected),
            "harvest_confirmed" => Some(LifecycleEventType::HarvestConfirmed),
            "dormant" => Some(LifecycleEventType::Dormant),
            "reactivated" => Some(LifecycleEventType::Reactivated),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One append-only entry in a field's lifecycle history.
///
/// `metadata` carries the serialized [`LifecycleMetadata`] delta applied at
/// this transition, plus audit-only keys (such as `dormancy_override`) that
/// replay ignores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub field_id: Uuid,
    pub event_type: LifecycleEventType,
    pub from_status: Option<FieldStatus>,
    pub to_status: FieldStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Metadata delta carried by this event. Unknown keys are skipped; a
    /// payload whose known keys cannot be decoded is logged and contributes
    /// nothing, so reconciliation can surface the corrupted event.
    pub fn metadata_delta(&self) -> LifecycleMetadata {
        match serde_json::from_value(self.metadata.clone()) {
            Ok(delta) => delta,
            Err(e) => {
                tracing::warn!(
                    "Event {} for field {} carries undecodable metadata ({}); treating as empty delta",
                    self.id,
                    self.field_id,
                    e
                );
                LifecycleMetadata::default()
            }
        }
    }
}

/// State a field's event history implies
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedState {
    pub status: FieldStatus,
    pub metadata: LifecycleMetadata,
}

/// Fold a field's lifecycle events, ordered oldest first, into the state they
/// imply. Returns `None` for an empty history.
pub fn replay(events: &[LifecycleEvent]) -> Option<ReplayedState> {
    let mut state: Option<ReplayedState> = None;
    for event in events {
        let metadata = match &state {
            Some(current) => current.metadata.apply(event.event_type, &event.metadata_delta()),
            None => LifecycleMetadata::default().apply(event.event_type, &event.metadata_delta()),
        };
        state = Some(ReplayedState {
            status: event.to_status,
            metadata,
        });
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + chrono::Duration::days(day as i64 - 1)
    }

    fn event(
        day: u32,
        event_type: LifecycleEventType,
        from: Option<FieldStatus>,
        to: FieldStatus,
        metadata: serde_json::Value,
    ) -> LifecycleEvent {
        LifecycleEvent {
            id: Uuid::new_v4(),
            field_id: Uuid::new_v4(),
            event_type,
            from_status: from,
            to_status: to,
            metadata,
            created_at: ts(day),
        }
    }

    #[test]
    fn test_replay_empty_history() {
        assert!(replay(&[]).is_none());
    }

    #[test]
    fn test_replay_full_crop_cycle() {
        let events = vec![
            event(
                1,
                LifecycleEventType::Created,
                None,
                FieldStatus::Active,
                json!({"schema_version": 1}),
            ),
            event(
                10,
                LifecycleEventType::HarvestDetected,
                Some(FieldStatus::Active),
                FieldStatus::Active,
                json!({
                    "schema_version": 1,
                    "harvest_detection_date": ts(10),
                    "peak_ndvi": 0.82,
                    "peak_ndre": 0.70,
                    "ndvi_drop_percent": 68.3,
                    "confidence": "high"
                }),
            ),
            event(
                12,
                LifecycleEventType::HarvestConfirmed,
                Some(FieldStatus::Active),
                FieldStatus::Harvested,
                json!({
                    "schema_version": 1,
                    "harvest_confirmed_date": ts(12),
                    "dormant_until": ts(12) + chrono::Duration::days(21),
                    "notes": "combine finished on the 12th"
                }),
            ),
            event(
                27,
                LifecycleEventType::Dormant,
                Some(FieldStatus::Harvested),
                FieldStatus::Dormant,
                json!({"schema_version": 1}),
            ),
        ];

        let state = replay(&events).unwrap();
        assert_eq!(state.status, FieldStatus::Dormant);
        assert_eq!(state.metadata.peak_ndvi, Some(0.82));
        assert_eq!(state.metadata.harvest_detection_date, Some(ts(10)));
        assert_eq!(state.metadata.harvest_confirmed_date, Some(ts(12)));
        assert_eq!(state.metadata.notes.as_deref(), Some("combine finished on the 12th"));
    }

    #[test]
    fn test_replay_clears_detection_stamp_on_reactivation() {
        let events = vec![
            event(
                1,
                LifecycleEventType::Created,
                None,
                FieldStatus::Active,
                json!({"schema_version": 1}),
            ),
            event(
                10,
                LifecycleEventType::HarvestDetected,
                Some(FieldStatus::Active),
                FieldStatus::Active,
                json!({"schema_version": 1, "harvest_detection_date": ts(10)}),
            ),
            event(
                12,
                LifecycleEventType::HarvestConfirmed,
                Some(FieldStatus::Active),
                FieldStatus::Harvested,
                json!({"schema_version": 1, "harvest_confirmed_date": ts(12)}),
            ),
            event(
                40,
                LifecycleEventType::Reactivated,
                Some(FieldStatus::Harvested),
                FieldStatus::Active,
                json!({
                    "schema_version": 1,
                    "reactivation_reason": "winter wheat",
                    "dormancy_override": true
                }),
            ),
        ];

        let state = replay(&events).unwrap();
        assert_eq!(state.status, FieldStatus::Active);
        assert_eq!(state.metadata.harvest_detection_date, None);
        assert_eq!(state.metadata.harvest_confirmed_date, Some(ts(12)));
        assert_eq!(state.metadata.reactivation_reason.as_deref(), Some("winter wheat"));
    }

    #[test]
    fn test_audit_keys_ignored_by_delta() {
        let e = event(
            5,
            LifecycleEventType::Reactivated,
            Some(FieldStatus::Dormant),
            FieldStatus::Active,
            json!({"schema_version": 1, "dormancy_override": true, "confidence": "high"}),
        );
        assert_eq!(e.metadata_delta(), LifecycleMetadata::default());
    }

    #[test]
    fn test_undecodable_metadata_is_empty_delta() {
        // A wrong-typed known key cannot be decoded; the delta degrades to
        // empty instead of poisoning the fold, and the failure is logged.
        let e = event(
            5,
            LifecycleEventType::HarvestDetected,
            Some(FieldStatus::Active),
            FieldStatus::Active,
            json!({"schema_version": 1, "peak_ndvi": "very high"}),
        );
        assert_eq!(e.metadata_delta(), LifecycleMetadata::default());

        let not_an_object = event(
            6,
            LifecycleEventType::Activated,
            Some(FieldStatus::Active),
            FieldStatus::Active,
            json!("legacy payload"),
        );
        assert_eq!(not_an_object.metadata_delta(), LifecycleMetadata::default());
    }

    #[test]
    fn test_event_type_round_trip() {
        for event_type in [
            LifecycleEventType::Created,
            LifecycleEventType::Activated,
            LifecycleEventType::HarvestDetected,
            LifecycleEventType::HarvestConfirmed,
            LifecycleEventType::Dormant,
            LifecycleEventType::Reactivated,
        ] {
            assert_eq!(LifecycleEventType::from_str(event_type.as_str()), Some(event_type));
        }
        assert_eq!(LifecycleEventType::from_str("rejected"), None);
    }
}
