//! Discrete driving events and their detectors.
//!
//! Speed events compare consecutive fixes; turning watches gyroscope rotation.
//!
//! ```text
//! fix ──► delta = speed − previous speed
//!           delta ≤ −hard_braking         → HardBraking
//!           delta ≥ +rapid_acceleration   → RapidAcceleration
//!         speed > speeding (armed)        → Speeding, disarm until speed ≤ limit
//!
//! rotation ≥ threshold continuously for turn_min_duration → Turning (once per turn)
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionId;
use crate::motion::{MotionSample, PositionSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingEventKind {
    HardBraking,
    RapidAcceleration,
    Speeding,
    Turning,
}

impl DrivingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrivingEventKind::HardBraking => "hard_braking",
            DrivingEventKind::RapidAcceleration => "rapid_acceleration",
            DrivingEventKind::Speeding => "speeding",
            DrivingEventKind::Turning => "turning",
        }
    }
}

impl std::fmt::Display for DrivingEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurements that triggered an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMetrics {
    /// Speed change between consecutive fixes (m/s).
    SpeedChange { from: f64, to: f64, delta: f64 },
    Speeding { speed: f64, limit: f64 },
    Turning {
        /// Highest rotation rate seen during the turn (rad/s).
        peak_rotation: f64,
        sustained: Duration,
    },
}

/// An event detected during an active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingEvent {
    pub kind: DrivingEventKind,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub location: Option<PositionSample>,
    pub metrics: EventMetrics,
}

impl DrivingEvent {
    /// Absolute speed change for braking and acceleration events.
    pub fn speed_delta(&self) -> Option<f64> {
        match self.metrics {
            EventMetrics::SpeedChange { delta, .. } => Some(delta.abs()),
            _ => None,
        }
    }
}

/// Thresholds for the event detectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventThresholds {
    /// Speed drop between fixes counted as hard braking (m/s, positive).
    pub hard_braking: f64,
    /// Speed gain between fixes counted as rapid acceleration (m/s).
    pub rapid_acceleration: f64,
    /// Speed above which the driver is speeding (m/s).
    pub speeding: f64,
    /// Rotation rate counted as turning (rad/s).
    pub turn_rotation: f64,
    pub turn_min_duration: Duration,
}

impl Default for EventThresholds {
    fn default() -> Self {
        Self {
            hard_braking: 3.0,
            rapid_acceleration: 3.0,
            speeding: 30.0,
            turn_rotation: 0.5,
            turn_min_duration: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Default)]
struct TurnTracker {
    started_at: Option<DateTime<Utc>>,
    peak: f64,
    reported: bool,
}

/// Per-session detector state.
#[derive(Debug)]
pub struct EventDetector {
    thresholds: EventThresholds,
    last_speed: Option<f64>,
    speeding: bool,
    turn: TurnTracker,
}

impl EventDetector {
    pub fn new(thresholds: EventThresholds) -> Self {
        Self {
            thresholds,
            last_speed: None,
            speeding: false,
            turn: TurnTracker::default(),
        }
    }

    /// Set the speed the next fix is compared against, without judging it.
    ///
    /// Speeding stays unarmed, so a session opened above the limit reports
    /// it on its first fix.
    pub fn seed(&mut self, speed: Option<f64>) {
        if speed.is_some() {
            self.last_speed = speed;
        }
    }

    /// Examine a fix; `speed` is its usable speed, if any.
    pub fn on_position(&mut self, speed: Option<f64>) -> Vec<(DrivingEventKind, EventMetrics)> {
        let mut events = Vec::new();
        let Some(speed) = speed else {
            return events;
        };

        if let Some(previous) = self.last_speed {
            let delta = speed - previous;
            let change = EventMetrics::SpeedChange {
                from: previous,
                to: speed,
                delta,
            };
            if delta <= -self.thresholds.hard_braking {
                events.push((DrivingEventKind::HardBraking, change));
            } else if delta >= self.thresholds.rapid_acceleration {
                events.push((DrivingEventKind::RapidAcceleration, change));
            }
        }
        self.last_speed = Some(speed);

        if speed > self.thresholds.speeding {
            if !self.speeding {
                self.speeding = true;
                events.push((
                    DrivingEventKind::Speeding,
                    EventMetrics::Speeding {
                        speed,
                        limit: self.thresholds.speeding,
                    },
                ));
            }
        } else {
            self.speeding = false;
        }

        events
    }

    /// Examine a gyroscope reading.
    pub fn on_motion(&mut self, sample: &MotionSample) -> Option<(DrivingEventKind, EventMetrics)> {
        if !sample.is_valid() || sample.rotation_magnitude < self.thresholds.turn_rotation {
            self.turn = TurnTracker::default();
            return None;
        }

        let started_at = *self.turn.started_at.get_or_insert(sample.timestamp);
        self.turn.peak = self.turn.peak.max(sample.rotation_magnitude);

        let sustained = (sample.timestamp - started_at).to_std().unwrap_or_default();
        if !self.turn.reported && sustained >= self.thresholds.turn_min_duration {
            self.turn.reported = true;
            return Some((
                DrivingEventKind::Turning,
                EventMetrics::Turning {
                    peak_rotation: self.turn.peak,
                    sustained,
                },
            ));
        }
        None
    }
}
