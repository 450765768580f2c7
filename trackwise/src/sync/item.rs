//! Items queued for delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::motion::{MotionState, PositionSample};

/// Delivery priority. Higher values are sent first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SyncPriority {
    Low,
    #[default]
    Normal,
    High,
    /// Never dropped by data shaping.
    Critical,
}

impl SyncPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPriority::Low => "low",
            SyncPriority::Normal => "normal",
            SyncPriority::High => "high",
            SyncPriority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SyncPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location record as sent to the remote sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    /// m/s; absent when the fix carried no usable speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionState>,
}

impl LocationPayload {
    /// Whether both records describe the same position fix.
    pub fn same_fix(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.latitude == other.latitude && self.longitude == other.longitude
    }

    pub fn from_sample(sample: &PositionSample, motion: Option<MotionState>) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed: sample.reported_speed(),
            accuracy: sample.accuracy,
            timestamp: sample.timestamp,
            motion,
        }
    }
}

/// A payload owned by the sync pipeline until delivered or dropped.
///
/// Only the pipeline changes `retry_count`, after a failed delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncItem {
    pub payload: LocationPayload,
    pub priority: SyncPriority,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncItem {
    pub fn new(payload: LocationPayload, priority: SyncPriority) -> Self {
        Self {
            payload,
            priority,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(SyncPriority::Critical > SyncPriority::High);
        assert!(SyncPriority::High > SyncPriority::Normal);
        assert!(SyncPriority::Normal > SyncPriority::Low);
        assert_eq!(SyncPriority::default(), SyncPriority::Normal);
    }

    #[test]
    fn test_payload_omits_unavailable_speed() {
        let sample = PositionSample::new(53.5, 10.0, -1.0, 8.0, Utc::now());
        let payload = LocationPayload::from_sample(&sample, None);
        assert_eq!(payload.speed, None);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("speed"));
        assert!(!json.contains("motion"));
    }

    #[test]
    fn test_new_item_starts_without_retries() {
        let sample = PositionSample::new(53.5, 10.0, 3.0, 8.0, Utc::now());
        let item = SyncItem::new(
            LocationPayload::from_sample(&sample, Some(MotionState::Walking)),
            SyncPriority::High,
        );
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.payload.motion, Some(MotionState::Walking));
    }
}
