//! Motion state classification with asymmetric hysteresis.
//!
//! Turns noisy acceleration and speed readings into a stable [`MotionState`].
//!
//! # Detection Logic
//!
//! ```text
//! no speed data                                  -> unknown
//! avg speed <  stationary_max_speed              -> stationary
//! avg speed >= driving_min_speed AND sustained
//!     acceleration (or no accelerometer data)    -> driving
//! avg speed >= cycling_max_speed                 -> driving
//! avg speed <  walking_max_speed                 -> walking (running if variance high)
//! otherwise                                      -> running if variance high, else cycling
//! ```
//!
//! # Hysteresis
//!
//! A tentative state that differs from the confirmed one must hold
//! continuously for a confirmation window before it is adopted:
//!
//! ```text
//! * -> driving          driving_confirmation   (default 30s)
//! driving -> *          stopped_confirmation   (default 2min, keyed on "not driving")
//! other transitions     activity_confirmation  (default 30s)
//! ```
//!
//! The stop window is longer so traffic lights do not split a trip. Windows
//! are measured on sample timestamps, never on wall-clock time.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::{MotionInput, MotionSample, MotionState, MotionTransition, PositionSample};
use super::window::SlidingWindow;
use crate::config::check_duration;
use crate::error::{ConfigError, SensorFault};

/// Default number of readings kept per sliding window.
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Thresholds and confirmation windows for the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    /// Readings kept in each sliding window.
    pub window_size: usize,

    /// Average speed below this is stationary (m/s).
    pub stationary_max_speed: f64,

    /// Upper bound of the walking band (m/s).
    pub walking_max_speed: f64,

    /// Average speed at or above this is always driving (m/s).
    pub cycling_max_speed: f64,

    /// Minimum average speed for driving when acceleration is sustained (m/s).
    pub driving_min_speed: f64,

    /// Minimum average acceleration magnitude for driving (m/s²).
    ///
    /// Ignored while no accelerometer data is available.
    pub driving_min_acceleration: f64,

    /// Acceleration variance at or above this marks running gait ((m/s²)²).
    pub running_min_variance: f64,

    /// How long driving conditions must hold before driving is confirmed.
    pub driving_confirmation: Duration,

    /// How long non-driving conditions must hold before leaving driving.
    pub stopped_confirmation: Duration,

    /// Window for all transitions that neither enter nor leave driving.
    pub activity_confirmation: Duration,

    /// Fixes with a worse accuracy radius are ignored (m).
    pub max_position_accuracy: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            stationary_max_speed: 1.0,
            walking_max_speed: 2.5,
            cycling_max_speed: 8.0,
            driving_min_speed: 5.0,
            driving_min_acceleration: 0.3,
            running_min_variance: 4.0,
            driving_confirmation: Duration::from_secs(30),
            stopped_confirmation: Duration::from_secs(120),
            activity_confirmation: Duration::from_secs(30),
            max_position_accuracy: 100.0,
        }
    }
}

impl MotionConfig {
    /// Shortest of the three confirmation windows.
    pub fn shortest_confirmation(&self) -> Duration {
        self.driving_confirmation
            .min(self.stopped_confirmation)
            .min(self.activity_confirmation)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 || self.window_size > 1000 {
            return Err(ConfigError::invalid(
                "motion.window_size",
                format!("must be between 1 and 1000, got {}", self.window_size),
            ));
        }

        let speeds = [
            self.stationary_max_speed,
            self.walking_max_speed,
            self.cycling_max_speed,
            self.driving_min_speed,
        ];
        if speeds.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(ConfigError::invalid(
                "motion.speed_thresholds",
                "speed thresholds must be finite and non-negative",
            ));
        }
        if !(self.stationary_max_speed < self.walking_max_speed
            && self.walking_max_speed < self.cycling_max_speed)
        {
            return Err(ConfigError::invalid(
                "motion.speed_thresholds",
                "expected stationary_max_speed < walking_max_speed < cycling_max_speed",
            ));
        }
        if self.driving_min_speed <= self.stationary_max_speed
            || self.driving_min_speed > self.cycling_max_speed
        {
            return Err(ConfigError::invalid(
                "motion.driving_min_speed",
                "must be above stationary_max_speed and at most cycling_max_speed",
            ));
        }
        if !self.driving_min_acceleration.is_finite() || self.driving_min_acceleration < 0.0 {
            return Err(ConfigError::invalid(
                "motion.driving_min_acceleration",
                "must be finite and non-negative",
            ));
        }
        if !self.running_min_variance.is_finite() || self.running_min_variance < 0.0 {
            return Err(ConfigError::invalid(
                "motion.running_min_variance",
                "must be finite and non-negative",
            ));
        }
        for (field, window) in [
            ("motion.driving_confirmation", self.driving_confirmation),
            ("motion.stopped_confirmation", self.stopped_confirmation),
            ("motion.activity_confirmation", self.activity_confirmation),
        ] {
            check_duration(field, window)?;
        }
        if !(self.max_position_accuracy.is_finite() && self.max_position_accuracy > 0.0) {
            return Err(ConfigError::invalid(
                "motion.max_position_accuracy",
                "must be a positive number of meters",
            ));
        }
        Ok(())
    }
}

/// A tentative state waiting out its confirmation window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingTransition {
    target: MotionState,
    since: DateTime<Utc>,
}

/// Classifies motion state from sensor and position samples.
///
/// Single-owner state machine: the running [`MotionService`](super::MotionService)
/// owns one and feeds it in arrival order.
#[derive(Debug)]
pub struct MotionClassifier {
    config: MotionConfig,

    /// Last confirmed state.
    confirmed: MotionState,

    /// State suggested by the most recent evaluation.
    tentative: MotionState,

    pending: Option<PendingTransition>,

    acceleration: SlidingWindow,
    speed: SlidingWindow,

    /// Last accepted fix, for deriving speed when the provider has none.
    last_position: Option<PositionSample>,

    /// False after a sensor fault until the next valid motion sample.
    sensor_available: bool,

    sensor_faults: u64,
}

impl MotionClassifier {
    /// Create a classifier, rejecting invalid configuration.
    pub fn new(config: MotionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::build(MotionConfig::default())
    }

    fn build(config: MotionConfig) -> Self {
        Self {
            acceleration: SlidingWindow::new(config.window_size),
            speed: SlidingWindow::new(config.window_size),
            config,
            confirmed: MotionState::Unknown,
            tentative: MotionState::Unknown,
            pending: None,
            last_position: None,
            sensor_available: true,
            sensor_faults: 0,
        }
    }

    /// The last confirmed state.
    pub fn current_state(&self) -> MotionState {
        self.confirmed
    }

    /// The state the latest samples point to, before confirmation.
    pub fn tentative_state(&self) -> MotionState {
        self.tentative
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn average_speed(&self) -> Option<f64> {
        self.speed.mean()
    }

    pub fn average_acceleration(&self) -> Option<f64> {
        self.acceleration.mean()
    }

    pub fn sensor_available(&self) -> bool {
        self.sensor_available
    }

    pub fn sensor_faults(&self) -> u64 {
        self.sensor_faults
    }

    /// When the pending transition would be confirmed if conditions hold.
    pub fn pending_deadline(&self) -> Option<DateTime<Utc>> {
        let pending = self.pending?;
        let window = self.window_for(self.confirmed, pending.target);
        let window = chrono::Duration::from_std(window).ok()?;
        pending.since.checked_add_signed(window)
    }

    /// Ingest a sample. Returns the transition if one was confirmed.
    pub fn ingest(&mut self, input: impl Into<MotionInput>) -> Option<MotionTransition> {
        match input.into() {
            MotionInput::Motion(sample) => self.ingest_motion(sample),
            MotionInput::Position(sample) => self.ingest_position(sample),
            MotionInput::SensorFault(reason) => {
                self.record_sensor_fault(SensorFault::new(reason));
                None
            }
        }
    }

    /// Fire the pending confirmation timer at `now` without a new sample.
    ///
    /// The tentative condition is unchanged since the last sample, so it is
    /// still holding.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<MotionTransition> {
        self.try_confirm(now)
    }

    /// Record a sensor read failure.
    ///
    /// The confirmed state is held. Acceleration history is discarded and
    /// classification falls back to speed only until the sensor recovers.
    pub fn record_sensor_fault(&mut self, fault: SensorFault) {
        self.sensor_faults += 1;
        if self.sensor_available {
            tracing::warn!(
                reason = %fault.reason,
                state = %self.confirmed,
                "Motion sensor unavailable, falling back to speed-only classification"
            );
        } else {
            tracing::debug!(reason = %fault.reason, "Motion sensor still unavailable");
        }
        self.sensor_available = false;
        self.acceleration.clear();
    }

    fn ingest_motion(&mut self, sample: MotionSample) -> Option<MotionTransition> {
        if !sample.is_valid() {
            self.record_sensor_fault(SensorFault::new("non-finite motion reading"));
            return None;
        }

        if !self.sensor_available {
            tracing::info!("Motion sensor recovered");
            self.sensor_available = true;
        }

        self.acceleration.push(sample.acceleration_magnitude);
        self.evaluate(sample.timestamp)
    }

    fn ingest_position(&mut self, sample: PositionSample) -> Option<MotionTransition> {
        if !sample.latitude.is_finite() || !sample.longitude.is_finite() {
            tracing::debug!("Ignoring position without coordinates");
            return None;
        }
        if sample.accuracy.is_nan() || sample.accuracy > self.config.max_position_accuracy {
            tracing::debug!(
                accuracy_m = sample.accuracy,
                max_accuracy_m = self.config.max_position_accuracy,
                "Ignoring inaccurate position"
            );
            return None;
        }

        let speed = sample.reported_speed().or_else(|| self.derived_speed(&sample));
        self.last_position = Some(sample);

        match speed {
            Some(speed) => {
                self.speed.push(speed);
                self.evaluate(sample.timestamp)
            }
            None => None,
        }
    }

    /// Speed from distance over time against the previous accepted fix.
    fn derived_speed(&self, sample: &PositionSample) -> Option<f64> {
        let previous = self.last_position?;
        let elapsed = (sample.timestamp - previous.timestamp).to_std().ok()?;
        if elapsed.is_zero() {
            return None;
        }
        Some(previous.distance_to(sample) / elapsed.as_secs_f64())
    }

    /// Classify the current windows without hysteresis.
    fn classify(&self) -> MotionState {
        let Some(avg_speed) = self.speed.mean() else {
            return MotionState::Unknown;
        };
        let cfg = &self.config;

        if avg_speed < cfg.stationary_max_speed {
            return MotionState::Stationary;
        }

        let sustained_acceleration = match self.acceleration.mean() {
            Some(avg_accel) => avg_accel >= cfg.driving_min_acceleration,
            // Speed-only fallback
            None => true,
        };
        if avg_speed >= cfg.cycling_max_speed
            || (avg_speed >= cfg.driving_min_speed && sustained_acceleration)
        {
            return MotionState::Driving;
        }

        let high_variance = self
            .acceleration
            .variance()
            .is_some_and(|v| v >= cfg.running_min_variance);

        if avg_speed < cfg.walking_max_speed {
            if high_variance {
                MotionState::Running
            } else {
                MotionState::Walking
            }
        } else if high_variance {
            MotionState::Running
        } else {
            MotionState::Cycling
        }
    }

    fn evaluate(&mut self, now: DateTime<Utc>) -> Option<MotionTransition> {
        let tentative = self.classify();
        self.tentative = tentative;

        if tentative == self.confirmed {
            if let Some(cancelled) = self.pending.take() {
                tracing::debug!(
                    state = %self.confirmed,
                    cancelled = %cancelled.target,
                    "Pending motion transition cancelled"
                );
            }
            return None;
        }

        match self.pending.as_mut() {
            // Leaving driving is keyed on "not driving", so moving between
            // non-driving candidates keeps the timer running.
            Some(pending) if self.confirmed == MotionState::Driving => {
                pending.target = tentative;
            }
            Some(pending) if pending.target == tentative => {}
            _ => {
                tracing::debug!(
                    from = %self.confirmed,
                    to = %tentative,
                    "Motion transition pending"
                );
                self.pending = Some(PendingTransition {
                    target: tentative,
                    since: now,
                });
            }
        }

        self.try_confirm(now)
    }

    fn try_confirm(&mut self, now: DateTime<Utc>) -> Option<MotionTransition> {
        let pending = self.pending?;
        let window = self.window_for(self.confirmed, pending.target);
        let held = (now - pending.since).to_std().unwrap_or_default();
        if held < window {
            return None;
        }

        let transition = MotionTransition {
            from: self.confirmed,
            to: pending.target,
            at: now,
        };
        self.confirmed = pending.target;
        self.pending = None;

        tracing::info!(
            from = %transition.from,
            to = %transition.to,
            held_secs = held.as_secs_f64(),
            avg_speed = self.speed.mean().unwrap_or_default(),
            "Motion state transition"
        );

        Some(transition)
    }

    fn window_for(&self, from: MotionState, to: MotionState) -> Duration {
        if to == MotionState::Driving {
            self.config.driving_confirmation
        } else if from == MotionState::Driving {
            self.config.stopped_confirmation
        } else {
            self.config.activity_confirmation
        }
    }

    /// Force a confirmed state (for testing).
    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: MotionState) {
        self.confirmed = state;
        self.tentative = state;
        self.pending = None;
    }
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn fix(speed: f64, secs: i64) -> PositionSample {
        PositionSample::new(53.55, 9.99, speed, 5.0, t(secs))
    }

    #[test]
    fn test_initial_state_is_unknown() {
        let classifier = MotionClassifier::with_defaults();
        assert_eq!(classifier.current_state(), MotionState::Unknown);
        assert!(classifier.pending_deadline().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MotionConfig {
            walking_max_speed: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            MotionClassifier::new(config),
            Err(ConfigError::Invalid { field: "motion.speed_thresholds", .. })
        ));

        let config = MotionConfig {
            driving_confirmation: Duration::ZERO,
            ..Default::default()
        };
        assert!(MotionClassifier::new(config).is_err());
    }

    #[test]
    fn test_classify_bands() {
        let mut c = MotionClassifier::with_defaults();
        c.ingest(fix(0.3, 0));
        assert_eq!(c.tentative_state(), MotionState::Stationary);

        let mut c = MotionClassifier::with_defaults();
        c.ingest(fix(1.5, 0));
        assert_eq!(c.tentative_state(), MotionState::Walking);

        let mut c = MotionClassifier::with_defaults();
        c.ingest(fix(4.0, 0));
        assert_eq!(c.tentative_state(), MotionState::Cycling);

        let mut c = MotionClassifier::with_defaults();
        c.ingest(fix(12.0, 0));
        assert_eq!(c.tentative_state(), MotionState::Driving);
    }

    #[test]
    fn test_high_variance_is_running() {
        let mut c = MotionClassifier::with_defaults();
        for (i, accel) in [0.5, 6.0, 0.5, 6.0].iter().enumerate() {
            c.ingest(MotionSample::new(*accel, 0.0, t(i as i64)));
        }
        c.ingest(fix(3.0, 4));
        assert_eq!(c.tentative_state(), MotionState::Running);
    }

    #[test]
    fn test_driving_needs_sustained_acceleration_when_sensor_present() {
        let mut c = MotionClassifier::with_defaults();
        c.ingest(MotionSample::new(0.05, 0.0, t(0)));
        c.ingest(fix(6.0, 1));
        // 6 m/s with almost no acceleration looks like cycling
        assert_eq!(c.tentative_state(), MotionState::Cycling);

        c.ingest(MotionSample::new(1.2, 0.0, t(2)));
        c.ingest(MotionSample::new(1.2, 0.0, t(3)));
        assert_eq!(c.tentative_state(), MotionState::Driving);
    }

    #[test]
    fn test_stationary_confirmed_at_window_not_before() {
        let mut c = MotionClassifier::with_defaults();
        for s in 0..30 {
            assert!(c.ingest(fix(0.2, s)).is_none(), "transition at {}s", s);
            assert_eq!(c.current_state(), MotionState::Unknown);
        }
        let transition = c.ingest(fix(0.2, 30)).expect("confirmed at window");
        assert_eq!(transition.to, MotionState::Stationary);
        assert_eq!(transition.at, t(30));
        assert_eq!(c.current_state(), MotionState::Stationary);
    }

    #[test]
    fn test_example_speed_buffer_enters_driving_exactly_once() {
        let mut c = MotionClassifier::with_defaults();
        let mut transitions = Vec::new();

        for (i, speed) in [0.0, 0.0, 0.0, 6.0, 7.0, 8.0, 9.0, 10.0].iter().enumerate() {
            transitions.extend(c.ingest(fix(*speed, i as i64)));
        }
        // Buffer average reaches 5.0 m/s on the last sample (t=7s)
        assert_eq!(c.tentative_state(), MotionState::Driving);
        assert_eq!(c.pending_deadline(), Some(t(37)));

        for s in 8..=60 {
            transitions.extend(c.ingest(fix(10.0, s)));
            if s < 37 {
                assert_eq!(c.current_state(), MotionState::Unknown, "early at {}s", s);
            }
        }

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, MotionState::Driving);
        assert_eq!(transitions[0].at, t(37));
    }

    #[test]
    fn test_tick_confirms_without_new_sample() {
        let mut c = MotionClassifier::with_defaults();
        c.ingest(fix(12.0, 0));
        assert!(c.tick(t(29)).is_none());
        let transition = c.tick(t(30)).expect("timer fires at deadline");
        assert_eq!(transition.to, MotionState::Driving);
    }

    #[test]
    fn test_reverted_condition_cancels_pending() {
        let mut c = MotionClassifier::with_defaults();
        c.set_state(MotionState::Stationary);

        c.ingest(fix(15.0, 0));
        assert!(c.pending_deadline().is_some());

        // Back to stationary before 30s: pending cancelled
        for s in 1..=20 {
            c.ingest(fix(0.0, s));
        }
        assert_eq!(c.tentative_state(), MotionState::Stationary);
        assert!(c.pending_deadline().is_none());
        assert!(c.tick(t(120)).is_none());
        assert_eq!(c.current_state(), MotionState::Stationary);
    }

    #[test]
    fn test_leaving_driving_uses_longer_window() {
        let config = MotionConfig {
            window_size: 1,
            ..Default::default()
        };
        let mut c = MotionClassifier::new(config).unwrap();
        c.set_state(MotionState::Driving);

        // Stoplight: stopped for 60s, then driving again
        for s in 0..60 {
            assert!(c.ingest(fix(0.0, s)).is_none());
        }
        c.ingest(fix(12.0, 60));
        assert_eq!(c.current_state(), MotionState::Driving);
        assert!(c.pending_deadline().is_none());

        // Parked: stop holds for the full 120s
        for s in 61..181 {
            assert!(c.ingest(fix(0.0, s)).is_none(), "left driving early at {}s", s);
        }
        let transition = c.ingest(fix(0.0, 181)).expect("stop confirmed");
        assert_eq!(transition.from, MotionState::Driving);
        assert_eq!(transition.to, MotionState::Stationary);
    }

    #[test]
    fn test_leaving_driving_timer_survives_non_driving_flicker() {
        let config = MotionConfig {
            window_size: 1,
            ..Default::default()
        };
        let mut c = MotionClassifier::new(config).unwrap();
        c.set_state(MotionState::Driving);

        c.ingest(fix(0.0, 0));
        let deadline = c.pending_deadline();
        c.ingest(fix(1.5, 10)); // walking
        c.ingest(fix(0.0, 20)); // stationary again
        assert_eq!(c.pending_deadline(), deadline);

        let transition = c.ingest(fix(1.5, 120)).expect("confirmed after 120s");
        assert_eq!(transition.to, MotionState::Walking);
    }

    #[test]
    fn test_sensor_fault_holds_state_and_falls_back_to_speed() {
        let mut c = MotionClassifier::with_defaults();
        c.set_state(MotionState::Walking);
        c.ingest(MotionSample::new(0.05, 0.0, t(0)));

        c.ingest(MotionInput::SensorFault("accelerometer timeout".into()));
        assert_eq!(c.current_state(), MotionState::Walking);
        assert!(!c.sensor_available());
        assert!(c.average_acceleration().is_none());

        // Speed-only: fast enough for driving without accelerometer data
        c.ingest(fix(6.0, 1));
        assert_eq!(c.tentative_state(), MotionState::Driving);

        c.ingest(MotionSample::new(0.5, 0.0, t(2)));
        assert!(c.sensor_available());
    }

    #[test]
    fn test_non_finite_motion_sample_is_a_fault() {
        let mut c = MotionClassifier::with_defaults();
        c.set_state(MotionState::Cycling);
        assert!(c.ingest(MotionSample::new(f64::NAN, 0.0, t(0))).is_none());
        assert_eq!(c.sensor_faults(), 1);
        assert_eq!(c.current_state(), MotionState::Cycling);
    }

    #[test]
    fn test_inaccurate_position_ignored() {
        let mut c = MotionClassifier::with_defaults();
        c.ingest(PositionSample::new(53.55, 9.99, 20.0, 500.0, t(0)));
        assert!(c.average_speed().is_none());
    }

    #[test]
    fn test_speed_derived_when_missing() {
        let mut c = MotionClassifier::with_defaults();
        c.ingest(PositionSample::new(0.0, 0.0, -1.0, 5.0, t(0)));
        assert!(c.average_speed().is_none());

        // ~111 m north in 10 s
        c.ingest(PositionSample::new(0.001, 0.0, -1.0, 5.0, t(10)));
        let speed = c.average_speed().unwrap();
        assert!((speed - 11.1).abs() < 0.2, "derived speed {}", speed);
    }

    proptest! {
        #[test]
        fn prop_transitions_never_closer_than_shortest_window(
            speeds in proptest::collection::vec(0.0f64..20.0, 1..400),
            step in 1i64..15,
        ) {
            let mut c = MotionClassifier::with_defaults();
            let min_gap = chrono::Duration::from_std(c.config().shortest_confirmation()).unwrap();
            let mut last = t(0);

            for (i, speed) in speeds.iter().enumerate() {
                let now = t(i as i64 * step);
                if let Some(transition) = c.ingest(fix(*speed, i as i64 * step)) {
                    prop_assert!(transition.at - last >= min_gap);
                    prop_assert_eq!(transition.at, now);
                    last = transition.at;
                }
            }
        }
    }
}
