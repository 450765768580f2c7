//! Sample and state types for motion classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw reading from the motion sensors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Linear acceleration magnitude with gravity removed (m/s²).
    pub acceleration_magnitude: f64,
    /// Gyroscope rotation rate magnitude (rad/s).
    pub rotation_magnitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl MotionSample {
    pub fn new(acceleration_magnitude: f64, rotation_magnitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            acceleration_magnitude,
            rotation_magnitude,
            timestamp,
        }
    }

    /// Whether the reading is usable. NaN or infinite readings are sensor faults.
    pub fn is_valid(&self) -> bool {
        self.acceleration_magnitude.is_finite()
            && self.rotation_magnitude.is_finite()
            && self.acceleration_magnitude >= 0.0
            && self.rotation_magnitude >= 0.0
    }
}

/// A position fix from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s. Negative or non-finite when the provider has none.
    pub speed: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        speed: f64,
        accuracy: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            speed,
            accuracy,
            timestamp,
        }
    }

    /// Reported speed, if the provider supplied one.
    pub fn reported_speed(&self) -> Option<f64> {
        (self.speed.is_finite() && self.speed >= 0.0).then_some(self.speed)
    }

    pub fn point(&self) -> crate::geo::GeoPoint {
        crate::geo::GeoPoint::new(self.latitude, self.longitude)
    }

    /// Distance to another fix in meters.
    pub fn distance_to(&self, other: &PositionSample) -> f64 {
        crate::geo::haversine_distance_m(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Classified activity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Stationary,
    Walking,
    Running,
    Cycling,
    Driving,
    #[default]
    Unknown,
}

impl MotionState {
    pub const ALL: [MotionState; 6] = [
        MotionState::Stationary,
        MotionState::Walking,
        MotionState::Running,
        MotionState::Cycling,
        MotionState::Driving,
        MotionState::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Stationary => "stationary",
            MotionState::Walking => "walking",
            MotionState::Running => "running",
            MotionState::Cycling => "cycling",
            MotionState::Driving => "driving",
            MotionState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the classifier can ingest.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionInput {
    Motion(MotionSample),
    Position(PositionSample),
    /// The motion sensor reported a read failure.
    SensorFault(String),
}

impl From<MotionSample> for MotionInput {
    fn from(sample: MotionSample) -> Self {
        MotionInput::Motion(sample)
    }
}

impl From<PositionSample> for MotionInput {
    fn from(sample: PositionSample) -> Self {
        MotionInput::Position(sample)
    }
}

/// A confirmed state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionTransition {
    pub from: MotionState,
    pub to: MotionState,
    pub at: DateTime<Utc>,
}
