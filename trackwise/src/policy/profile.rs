//! Tracking profile types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::motion::MotionState;

/// Power/precision tier, ordered from cheapest to most precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTier {
    UltraPowerSaver,
    PowerSaver,
    Balanced,
    Performance,
    HighPerformance,
}

impl ProfileTier {
    /// One tier more precise, saturating at `HighPerformance`.
    pub fn upgraded(self) -> Self {
        match self {
            ProfileTier::UltraPowerSaver => ProfileTier::PowerSaver,
            ProfileTier::PowerSaver => ProfileTier::Balanced,
            ProfileTier::Balanced => ProfileTier::Performance,
            ProfileTier::Performance | ProfileTier::HighPerformance => ProfileTier::HighPerformance,
        }
    }

    /// One tier cheaper, never below `PowerSaver`.
    ///
    /// `UltraPowerSaver` is reserved for a critical battery and is never
    /// reached by stepping down.
    pub fn downgraded(self) -> Self {
        match self {
            ProfileTier::UltraPowerSaver => ProfileTier::UltraPowerSaver,
            ProfileTier::PowerSaver | ProfileTier::Balanced => ProfileTier::PowerSaver,
            ProfileTier::Performance => ProfileTier::Balanced,
            ProfileTier::HighPerformance => ProfileTier::Performance,
        }
    }

    /// Base tier for a motion state.
    pub fn for_motion(state: MotionState) -> Self {
        match state {
            MotionState::Stationary => ProfileTier::PowerSaver,
            MotionState::Walking => ProfileTier::Balanced,
            MotionState::Running | MotionState::Cycling => ProfileTier::Performance,
            MotionState::Driving => ProfileTier::HighPerformance,
            MotionState::Unknown => ProfileTier::Balanced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileTier::UltraPowerSaver => "ultra_power_saver",
            ProfileTier::PowerSaver => "power_saver",
            ProfileTier::Balanced => "balanced",
            ProfileTier::Performance => "performance",
            ProfileTier::HighPerformance => "high_performance",
        }
    }
}

impl std::fmt::Display for ProfileTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested accuracy of the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    /// Cell-tower or coarse network location.
    Lowest,
    Low,
    Medium,
    High,
    /// Best available, typically satellite positioning.
    Best,
}

/// Concrete settings for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierSettings {
    pub accuracy: AccuracyTier,
    /// Minimum distance between fixes before motion scaling (m).
    pub min_distance_m: f64,
    pub sampling_interval: Duration,
}

impl TierSettings {
    pub const fn new(accuracy: AccuracyTier, min_distance_m: f64, interval_secs: u64) -> Self {
        Self {
            accuracy,
            min_distance_m,
            sampling_interval: Duration::from_secs(interval_secs),
        }
    }
}

/// Composite trigger strategy used when the platform limits background
/// location delivery.
///
/// Instead of continuous polling, fixes arrive from three sources at once:
/// a proximity region around the last known point, a periodic batched flush,
/// and fixes other apps requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeStrategy {
    /// Radius of the proximity trigger around the last known point (m).
    pub geofence_radius_m: f64,
    /// Where the proximity region is anchored; `None` until a fix is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<GeoPoint>,
    /// How often accumulated fixes are delivered in a batch.
    pub batch_flush_interval: Duration,
    /// Consume fixes obtained for other purposes.
    pub passive: bool,
}

/// How fixes are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplingMode {
    /// The provider polls continuously at the profile's interval/distance.
    Continuous,
    /// Geofence + batched flush + passive fixes.
    Composite(CompositeStrategy),
}

/// The location-sampling policy currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingProfile {
    pub tier: ProfileTier,
    pub accuracy: AccuracyTier,
    pub min_distance_m: f64,
    pub sampling_interval: Duration,
    pub mode: SamplingMode,
}

impl TrackingProfile {
    pub fn is_composite(&self) -> bool {
        matches!(self.mode, SamplingMode::Composite(_))
    }
}

impl Default for TrackingProfile {
    /// The balanced profile in effect before any signal arrives.
    fn default() -> Self {
        let balanced = super::engine::TierTable::default().balanced;
        Self {
            tier: ProfileTier::Balanced,
            accuracy: balanced.accuracy,
            min_distance_m: balanced.min_distance_m,
            sampling_interval: balanced.sampling_interval,
            mode: SamplingMode::Continuous,
        }
    }
}

impl std::fmt::Display for TrackingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?}, {:.0}m, {}s",
            self.tier,
            self.accuracy,
            self.min_distance_m,
            self.sampling_interval.as_secs()
        )?;
        match self.mode {
            SamplingMode::Continuous => write!(f, ", continuous)"),
            SamplingMode::Composite(c) => {
                write!(f, ", composite: geofence {:.0}m", c.geofence_radius_m)?;
                if let Some(center) = c.center {
                    write!(f, " at {:.5},{:.5}", center.latitude, center.longitude)?;
                }
                write!(f, ", flush {}s)", c.batch_flush_interval.as_secs())
            }
        }
    }
}
