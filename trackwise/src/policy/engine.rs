//! Pure tracking-profile evaluation.
//!
//! # Algorithm
//!
//! ```text
//! 1. base tier      <- motion state lookup
//! 2. battery        critical      -> ultra power saver (overrides everything)
//!                   low           -> one tier down (floor: power saver)
//!                   high/full     -> one tier up, only in foreground at normal thermal
//! 3. tier settings  <- tier table; min distance scaled per motion state
//! 4. mode           background-limited AND not foreground AND no real-time request
//!                       -> composite (geofence + batched flush + passive)
//!                   otherwise -> continuous
//! ```
//!
//! Missing signals degrade to their lowest-information default so an
//! evaluation always produces a profile.

use std::time::Duration;

use super::profile::{
    AccuracyTier, CompositeStrategy, ProfileTier, SamplingMode, TierSettings, TrackingProfile,
};
use super::signals::{AppState, BatteryLevel, NetworkQuality, ThermalState};
use crate::config::{check_duration, MAX_DURATION};
use crate::error::ConfigError;
use crate::motion::MotionState;

/// Battery level assumed when the battery source is unavailable.
pub const DEFAULT_BATTERY: BatteryLevel = BatteryLevel::Medium;
/// Thermal state assumed when the thermal source is unavailable.
pub const DEFAULT_THERMAL: ThermalState = ThermalState::Normal;
/// App state assumed when the lifecycle source is unavailable.
pub const DEFAULT_APP_STATE: AppState = AppState::Background;
/// Network quality assumed when the connectivity source is unavailable.
pub const DEFAULT_NETWORK: NetworkQuality = NetworkQuality::Fair;

/// Settings for each [`ProfileTier`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierTable {
    pub ultra_power_saver: TierSettings,
    pub power_saver: TierSettings,
    pub balanced: TierSettings,
    pub performance: TierSettings,
    pub high_performance: TierSettings,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            ultra_power_saver: TierSettings::new(AccuracyTier::Lowest, 500.0, 900),
            power_saver: TierSettings::new(AccuracyTier::Low, 100.0, 120),
            balanced: TierSettings::new(AccuracyTier::Medium, 50.0, 30),
            performance: TierSettings::new(AccuracyTier::High, 20.0, 10),
            high_performance: TierSettings::new(AccuracyTier::Best, 10.0, 5),
        }
    }
}

impl TierTable {
    pub fn get(&self, tier: ProfileTier) -> &TierSettings {
        match tier {
            ProfileTier::UltraPowerSaver => &self.ultra_power_saver,
            ProfileTier::PowerSaver => &self.power_saver,
            ProfileTier::Balanced => &self.balanced,
            ProfileTier::Performance => &self.performance,
            ProfileTier::HighPerformance => &self.high_performance,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (ProfileTier, &TierSettings)> {
        [
            (ProfileTier::UltraPowerSaver, &self.ultra_power_saver),
            (ProfileTier::PowerSaver, &self.power_saver),
            (ProfileTier::Balanced, &self.balanced),
            (ProfileTier::Performance, &self.performance),
            (ProfileTier::HighPerformance, &self.high_performance),
        ]
        .into_iter()
    }
}

/// Per-motion scaling of the tier's minimum distance.
///
/// Keeps absolute power cost comparable across motion types at a given tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceMultipliers {
    pub stationary: f64,
    pub walking: f64,
    pub running: f64,
    pub cycling: f64,
    pub driving: f64,
    pub unknown: f64,
}

impl Default for DistanceMultipliers {
    fn default() -> Self {
        Self {
            stationary: 4.0,
            walking: 2.0,
            running: 1.5,
            cycling: 1.0,
            driving: 0.5,
            unknown: 1.0,
        }
    }
}

impl DistanceMultipliers {
    pub fn get(&self, state: MotionState) -> f64 {
        match state {
            MotionState::Stationary => self.stationary,
            MotionState::Walking => self.walking,
            MotionState::Running => self.running,
            MotionState::Cycling => self.cycling,
            MotionState::Driving => self.driving,
            MotionState::Unknown => self.unknown,
        }
    }
}

/// Configuration for the policy engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    pub tiers: TierTable,
    pub distance_multipliers: DistanceMultipliers,

    /// Minimum proximity-trigger radius in composite mode (m).
    pub geofence_radius_m: f64,

    /// Batched flush interval in composite mode.
    pub batch_flush_interval: Duration,

    /// Fixed re-evaluation tick of the running service.
    pub reevaluate_interval: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            distance_multipliers: DistanceMultipliers::default(),
            geofence_radius_m: 150.0,
            batch_flush_interval: Duration::from_secs(15 * 60),
            reevaluate_interval: Duration::from_secs(60),
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (tier, settings) in self.tiers.iter() {
            if !(settings.min_distance_m.is_finite() && settings.min_distance_m >= 0.0) {
                return Err(ConfigError::invalid(
                    "policy.tiers",
                    format!("{} min distance must be finite and non-negative", tier),
                ));
            }
            if check_duration("policy.tiers", settings.sampling_interval).is_err() {
                return Err(ConfigError::invalid(
                    "policy.tiers",
                    format!(
                        "{} sampling interval must be non-zero and at most {} seconds",
                        tier,
                        MAX_DURATION.as_secs()
                    ),
                ));
            }
        }

        let m = &self.distance_multipliers;
        let multipliers = [m.stationary, m.walking, m.running, m.cycling, m.driving, m.unknown];
        if multipliers.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(ConfigError::invalid(
                "policy.distance_multipliers",
                "multipliers must be finite and positive",
            ));
        }

        if !(self.geofence_radius_m.is_finite() && self.geofence_radius_m > 0.0) {
            return Err(ConfigError::invalid(
                "policy.geofence_radius_m",
                "must be a positive number of meters",
            ));
        }
        check_duration("policy.batch_flush_interval", self.batch_flush_interval)?;
        check_duration("policy.reevaluate_interval", self.reevaluate_interval)
    }
}

/// Everything a profile is computed from.
///
/// `None` means the corresponding signal source is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PolicyInputs {
    pub motion: MotionState,
    pub battery: Option<BatteryLevel>,
    pub thermal: Option<ThermalState>,
    pub app: Option<AppState>,
    pub network: Option<NetworkQuality>,
    /// The host platform restricts background location delivery.
    pub background_limited: bool,
    /// The user explicitly asked for real-time delivery.
    pub realtime_requested: bool,
}

impl PolicyInputs {
    pub fn new(
        motion: MotionState,
        battery: BatteryLevel,
        thermal: ThermalState,
        app: AppState,
        network: NetworkQuality,
        background_limited: bool,
    ) -> Self {
        Self {
            motion,
            battery: Some(battery),
            thermal: Some(thermal),
            app: Some(app),
            network: Some(network),
            background_limited,
            realtime_requested: false,
        }
    }

    pub fn battery_or_default(&self) -> BatteryLevel {
        self.battery.unwrap_or(DEFAULT_BATTERY)
    }

    pub fn thermal_or_default(&self) -> ThermalState {
        self.thermal.unwrap_or(DEFAULT_THERMAL)
    }

    pub fn app_or_default(&self) -> AppState {
        self.app.unwrap_or(DEFAULT_APP_STATE)
    }

    pub fn network_or_default(&self) -> NetworkQuality {
        self.network.unwrap_or(DEFAULT_NETWORK)
    }
}

/// Computes [`TrackingProfile`]s from [`PolicyInputs`].
///
/// Stateless: the same inputs always produce the same profile.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: PolicyConfig::default(),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// The profile in effect before any signal arrives.
    pub fn initial_profile(&self) -> TrackingProfile {
        self.evaluate(&PolicyInputs::default())
    }

    /// Tier after motion lookup and battery adjustment.
    pub fn select_tier(&self, inputs: &PolicyInputs) -> ProfileTier {
        let base = ProfileTier::for_motion(inputs.motion);

        match inputs.battery_or_default() {
            BatteryLevel::Critical => ProfileTier::UltraPowerSaver,
            BatteryLevel::Low => base.downgraded(),
            BatteryLevel::Medium => base,
            BatteryLevel::High | BatteryLevel::Full => {
                let may_upgrade = inputs.app_or_default() == AppState::Foreground
                    && inputs.thermal_or_default() == ThermalState::Normal;
                if may_upgrade {
                    base.upgraded()
                } else {
                    base
                }
            }
        }
    }

    pub fn evaluate(&self, inputs: &PolicyInputs) -> TrackingProfile {
        let tier = self.select_tier(inputs);
        let settings = self.config.tiers.get(tier);
        let min_distance_m =
            settings.min_distance_m * self.config.distance_multipliers.get(inputs.motion);

        let composite = inputs.background_limited
            && inputs.app_or_default() != AppState::Foreground
            && !inputs.realtime_requested;

        let mode = if composite {
            SamplingMode::Composite(self.composite_strategy(inputs, min_distance_m))
        } else {
            SamplingMode::Continuous
        };

        TrackingProfile {
            tier,
            accuracy: settings.accuracy,
            min_distance_m,
            sampling_interval: settings.sampling_interval,
            mode,
        }
    }

    fn composite_strategy(&self, inputs: &PolicyInputs, min_distance_m: f64) -> CompositeStrategy {
        // Deliveries on a poor link mostly fail; wake the radio half as often.
        let batch_flush_interval = match inputs.network_or_default() {
            NetworkQuality::Poor => self.config.batch_flush_interval.saturating_mul(2),
            _ => self.config.batch_flush_interval,
        };

        CompositeStrategy {
            geofence_radius_m: self.config.geofence_radius_m.max(min_distance_m),
            center: None,
            batch_flush_interval,
            passive: true,
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Remembers the last applied profile to suppress redundant re-application.
#[derive(Debug, Clone)]
pub struct ProfileTracker {
    last_applied: TrackingProfile,
}

impl ProfileTracker {
    pub fn new(initial: TrackingProfile) -> Self {
        Self {
            last_applied: initial,
        }
    }

    pub fn last_applied(&self) -> &TrackingProfile {
        &self.last_applied
    }

    /// Returns the profile if it differs from the last applied one.
    pub fn offer(&mut self, profile: TrackingProfile) -> Option<TrackingProfile> {
        if profile == self.last_applied {
            None
        } else {
            self.last_applied = profile;
            Some(profile)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inputs(motion: MotionState, battery: BatteryLevel) -> PolicyInputs {
        PolicyInputs::new(
            motion,
            battery,
            ThermalState::Normal,
            AppState::Foreground,
            NetworkQuality::Good,
            false,
        )
    }

    #[test]
    fn test_motion_lookup_at_medium_battery() {
        let engine = PolicyEngine::with_defaults();
        let cases = [
            (MotionState::Stationary, ProfileTier::PowerSaver),
            (MotionState::Walking, ProfileTier::Balanced),
            (MotionState::Running, ProfileTier::Performance),
            (MotionState::Cycling, ProfileTier::Performance),
            (MotionState::Driving, ProfileTier::HighPerformance),
            (MotionState::Unknown, ProfileTier::Balanced),
        ];
        for (motion, tier) in cases {
            let profile = engine.evaluate(&inputs(motion, BatteryLevel::Medium));
            assert_eq!(profile.tier, tier, "motion {}", motion);
        }
    }

    #[test]
    fn test_low_battery_downgrades_with_floor() {
        let engine = PolicyEngine::with_defaults();
        let walking = engine.evaluate(&inputs(MotionState::Walking, BatteryLevel::Low));
        assert_eq!(walking.tier, ProfileTier::PowerSaver);

        let stationary = engine.evaluate(&inputs(MotionState::Stationary, BatteryLevel::Low));
        assert_eq!(stationary.tier, ProfileTier::PowerSaver);
    }

    #[test]
    fn test_high_battery_upgrade_needs_foreground_and_normal_thermal() {
        let engine = PolicyEngine::with_defaults();
        let mut i = inputs(MotionState::Walking, BatteryLevel::High);
        assert_eq!(engine.evaluate(&i).tier, ProfileTier::Performance);

        i.app = Some(AppState::Background);
        assert_eq!(engine.evaluate(&i).tier, ProfileTier::Balanced);

        i.app = Some(AppState::Foreground);
        i.thermal = Some(ThermalState::Serious);
        assert_eq!(engine.evaluate(&i).tier, ProfileTier::Balanced);
    }

    #[test]
    fn test_min_distance_scaled_by_motion() {
        let engine = PolicyEngine::with_defaults();
        // Stationary at power saver: 100m × 4
        let p = engine.evaluate(&inputs(MotionState::Stationary, BatteryLevel::Medium));
        assert!((p.min_distance_m - 400.0).abs() < 1e-9);
        // Driving at high performance: 10m × 0.5
        let p = engine.evaluate(&inputs(MotionState::Driving, BatteryLevel::Medium));
        assert!((p.min_distance_m - 5.0).abs() < 1e-9);
        assert_eq!(p.accuracy, AccuracyTier::Best);
        assert_eq!(p.sampling_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_signals_use_defaults() {
        let engine = PolicyEngine::with_defaults();
        let profile = engine.evaluate(&PolicyInputs {
            motion: MotionState::Walking,
            ..Default::default()
        });
        // Unknown battery is medium: no adjustment
        assert_eq!(profile.tier, ProfileTier::Balanced);
        assert_eq!(profile.mode, SamplingMode::Continuous);
    }

    #[test]
    fn test_initial_profile_is_balanced() {
        let engine = PolicyEngine::with_defaults();
        assert_eq!(engine.initial_profile(), TrackingProfile::default());
    }

    #[test]
    fn test_background_limited_selects_composite() {
        let engine = PolicyEngine::with_defaults();
        let mut i = inputs(MotionState::Walking, BatteryLevel::Medium);
        i.background_limited = true;
        i.app = Some(AppState::Background);

        let profile = engine.evaluate(&i);
        let SamplingMode::Composite(strategy) = profile.mode else {
            panic!("expected composite mode, got {:?}", profile.mode);
        };
        assert!(strategy.passive);
        assert_eq!(strategy.batch_flush_interval, Duration::from_secs(900));
        // 50m × 2 is below the 150m floor
        assert!((strategy.geofence_radius_m - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_not_used_in_foreground_or_when_realtime_requested() {
        let engine = PolicyEngine::with_defaults();
        let mut i = inputs(MotionState::Walking, BatteryLevel::Medium);
        i.background_limited = true;
        assert!(!engine.evaluate(&i).is_composite());

        i.app = Some(AppState::Suspended);
        i.realtime_requested = true;
        assert!(!engine.evaluate(&i).is_composite());
    }

    #[test]
    fn test_composite_flush_slows_on_poor_network() {
        let engine = PolicyEngine::with_defaults();
        let mut i = inputs(MotionState::Walking, BatteryLevel::Medium);
        i.background_limited = true;
        i.app = Some(AppState::Background);
        i.network = Some(NetworkQuality::Poor);

        match engine.evaluate(&i).mode {
            SamplingMode::Composite(s) => {
                assert_eq!(s.batch_flush_interval, Duration::from_secs(1800))
            }
            other => panic!("expected composite, got {:?}", other),
        }
    }

    #[test]
    fn test_profile_tracker_suppresses_repeats() {
        let engine = PolicyEngine::with_defaults();
        let mut tracker = ProfileTracker::new(engine.initial_profile());

        let unchanged = engine.evaluate(&PolicyInputs::default());
        assert!(tracker.offer(unchanged).is_none());

        let driving = engine.evaluate(&inputs(MotionState::Driving, BatteryLevel::Medium));
        assert_eq!(tracker.offer(driving), Some(driving));
        assert!(tracker.offer(driving).is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PolicyConfig::default();
        config.tiers.balanced.sampling_interval = Duration::ZERO;
        assert!(PolicyEngine::new(config).is_err());

        let mut config = PolicyConfig::default();
        config.distance_multipliers.driving = 0.0;
        assert!(PolicyEngine::new(config).is_err());
    }

    #[test]
    fn test_oversized_intervals_rejected_at_construction() {
        let config = PolicyConfig {
            batch_flush_interval: Duration::from_secs(u64::MAX),
            ..PolicyConfig::default()
        };
        assert!(matches!(
            PolicyEngine::new(config),
            Err(ConfigError::Invalid {
                field: "policy.batch_flush_interval",
                ..
            })
        ));

        let mut config = PolicyConfig::default();
        config.tiers.power_saver.sampling_interval = MAX_DURATION + Duration::from_secs(1);
        assert!(PolicyEngine::new(config).is_err());
    }

    #[test]
    fn test_longest_flush_interval_doubles_on_poor_network() {
        let config = PolicyConfig {
            batch_flush_interval: MAX_DURATION,
            ..PolicyConfig::default()
        };
        let engine = PolicyEngine::new(config).unwrap();
        let mut i = inputs(MotionState::Stationary, BatteryLevel::Medium);
        i.background_limited = true;
        i.app = Some(AppState::Background);
        i.network = Some(NetworkQuality::Poor);

        match engine.evaluate(&i).mode {
            SamplingMode::Composite(s) => assert_eq!(s.batch_flush_interval, MAX_DURATION * 2),
            other => panic!("expected composite, got {:?}", other),
        }
    }

    fn arb_inputs() -> impl Strategy<Value = PolicyInputs> {
        (
            proptest::sample::select(MotionState::ALL.to_vec()),
            proptest::option::of(proptest::sample::select(BatteryLevel::ALL.to_vec())),
            proptest::option::of(proptest::sample::select(ThermalState::ALL.to_vec())),
            proptest::option::of(proptest::sample::select(AppState::ALL.to_vec())),
            proptest::option::of(proptest::sample::select(NetworkQuality::ALL.to_vec())),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(motion, battery, thermal, app, network, background_limited, realtime_requested)| {
                    PolicyInputs {
                        motion,
                        battery,
                        thermal,
                        app,
                        network,
                        background_limited,
                        realtime_requested,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_pure(sequence in proptest::collection::vec(arb_inputs(), 1..50)) {
            let engine = PolicyEngine::with_defaults();
            let first: Vec<_> = sequence.iter().map(|i| engine.evaluate(i)).collect();
            // Re-evaluate in reverse order: history must not matter
            let second: Vec<_> = sequence.iter().rev().map(|i| engine.evaluate(i)).collect();
            for (a, b) in first.iter().zip(second.iter().rev()) {
                prop_assert_eq!(a, b);
            }
        }

        #[test]
        fn prop_critical_battery_is_always_ultra_power_saver(mut inputs in arb_inputs()) {
            inputs.battery = Some(BatteryLevel::Critical);
            let engine = PolicyEngine::with_defaults();
            prop_assert_eq!(engine.evaluate(&inputs).tier, ProfileTier::UltraPowerSaver);
        }

        #[test]
        fn prop_tier_never_below_power_saver_unless_critical(inputs in arb_inputs()) {
            prop_assume!(inputs.battery != Some(BatteryLevel::Critical));
            let engine = PolicyEngine::with_defaults();
            prop_assert!(engine.evaluate(&inputs).tier >= ProfileTier::PowerSaver);
        }
    }
}
