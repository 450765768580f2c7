//! Session lifecycle driven by confirmed motion transitions.
//!
//! # State Machine
//!
//! ```text
//! Idle --[confirmed → driving]--> Active      (session opened at latest fix)
//! Active --[confirmed driving → other]--> Idle (session finalized, handed off)
//! Active --[start request]--> Active           (no-op)
//! ```
//!
//! The tracker never classifies motion itself; it only follows the
//! classifier's confirmed transitions.

use chrono::{DateTime, Utc};

use super::events::{DrivingEvent, EventDetector, EventThresholds};
use super::session::{DrivingSession, SessionId};
use crate::config::check_duration;
use crate::error::ConfigError;
use crate::motion::{MotionSample, MotionState, MotionTransition, PositionSample};

/// Configuration for driving session tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct DrivingConfig {
    pub events: EventThresholds,
    /// Fixes less accurate than this (m) are not added to the route.
    pub max_route_accuracy: f64,
}

impl Default for DrivingConfig {
    fn default() -> Self {
        Self {
            events: EventThresholds::default(),
            max_route_accuracy: 50.0,
        }
    }
}

impl DrivingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.events;
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if !positive(e.hard_braking) {
            return Err(ConfigError::invalid(
                "driving.hard_braking_threshold",
                "must be a positive speed change",
            ));
        }
        if !positive(e.rapid_acceleration) {
            return Err(ConfigError::invalid(
                "driving.rapid_acceleration_threshold",
                "must be a positive speed change",
            ));
        }
        if !positive(e.speeding) {
            return Err(ConfigError::invalid(
                "driving.speeding_threshold",
                "must be a positive speed",
            ));
        }
        if !positive(e.turn_rotation) {
            return Err(ConfigError::invalid(
                "driving.turn_rotation_threshold",
                "must be a positive rotation rate",
            ));
        }
        check_duration("driving.turn_min_duration", e.turn_min_duration)?;
        if !positive(self.max_route_accuracy) {
            return Err(ConfigError::invalid(
                "driving.max_route_accuracy",
                "must be a positive number of meters",
            ));
        }
        Ok(())
    }
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(SessionId),
    /// A session was already running; nothing was created.
    AlreadyActive(SessionId),
}

impl StartOutcome {
    pub fn session_id(&self) -> &SessionId {
        match self {
            StartOutcome::Started(id) | StartOutcome::AlreadyActive(id) => id,
        }
    }
}

/// What a transition did to the session lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleChange {
    Started(DrivingSession),
    Finished(DrivingSession),
}

struct ActiveSession {
    session: DrivingSession,
    detector: EventDetector,
}

/// Tracks driving sessions for one identity.
pub struct DrivingSessionTracker {
    config: DrivingConfig,
    user_ref: String,
    active: Option<ActiveSession>,
    last_position: Option<PositionSample>,
    sessions_started: u64,
}

impl DrivingSessionTracker {
    pub fn new(config: DrivingConfig, user_ref: impl Into<String>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            user_ref: user_ref.into(),
            active: None,
            last_position: None,
            sessions_started: 0,
        })
    }

    pub fn user_ref(&self) -> &str {
        &self.user_ref
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_session(&self) -> Option<&DrivingSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Open a session at `at`, unless one is already running.
    pub fn start(&mut self, at: DateTime<Utc>) -> StartOutcome {
        if let Some(active) = &self.active {
            tracing::debug!(session = %active.session.id, "Driving session already active");
            return StartOutcome::AlreadyActive(active.session.id.clone());
        }

        let id = SessionId::generate(&self.user_ref, at, self.sessions_started);
        self.sessions_started += 1;

        let session = DrivingSession::start(id.clone(), self.user_ref.clone(), at, self.last_position);
        let mut detector = EventDetector::new(self.config.events);
        // Seed the speed chain so the first in-session fix has a predecessor
        detector.seed(self.last_position.and_then(|p| p.reported_speed()));

        tracing::info!(session = %id, user = %self.user_ref, "Driving session started");
        self.active = Some(ActiveSession { session, detector });
        StartOutcome::Started(id)
    }

    /// Finalize the running session, if any.
    pub fn stop(&mut self, at: DateTime<Utc>) -> Option<DrivingSession> {
        let ActiveSession { mut session, .. } = self.active.take()?;
        session.finish(at, self.last_position);

        tracing::info!(
            session = %session.id,
            distance_m = session.distance_m as u64,
            max_speed = session.max_speed,
            average_speed = session.average_speed,
            events = session.event_count,
            "Driving session finished"
        );
        Some(session)
    }

    /// Follow a confirmed motion transition.
    pub fn on_transition(&mut self, transition: &MotionTransition) -> Option<LifecycleChange> {
        if transition.to == MotionState::Driving {
            match self.start(transition.at) {
                StartOutcome::Started(_) => self
                    .active_session()
                    .cloned()
                    .map(LifecycleChange::Started),
                StartOutcome::AlreadyActive(_) => None,
            }
        } else if transition.from == MotionState::Driving {
            self.stop(transition.at).map(LifecycleChange::Finished)
        } else {
            None
        }
    }

    /// Process a fix. Returns the events it triggered.
    pub fn on_position(&mut self, sample: PositionSample) -> Vec<DrivingEvent> {
        // Rejected fixes never become a session boundary either
        if sample.accuracy.is_nan() || sample.accuracy > self.config.max_route_accuracy {
            tracing::trace!(accuracy = sample.accuracy, "Skipping inaccurate fix");
            return Vec::new();
        }

        let previous = self.last_position.replace(sample);
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };

        let speed = sample.reported_speed().or_else(|| {
            let previous = previous?;
            let dt = (sample.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
            (dt > 0.0).then(|| previous.distance_to(&sample) / dt)
        });

        active.session.extend_route(sample, speed);

        let events: Vec<DrivingEvent> = active
            .detector
            .on_position(speed)
            .into_iter()
            .map(|(kind, metrics)| DrivingEvent {
                kind,
                session_id: active.session.id.clone(),
                timestamp: sample.timestamp,
                location: Some(sample),
                metrics,
            })
            .collect();
        active.session.event_count += events.len() as u32;

        for event in &events {
            tracing::info!(session = %event.session_id, kind = %event.kind, metrics = ?event.metrics, "Driving event");
        }
        events
    }

    /// Process a motion-sensor reading.
    pub fn on_motion(&mut self, sample: &MotionSample) -> Option<DrivingEvent> {
        let active = self.active.as_mut()?;
        let (kind, metrics) = active.detector.on_motion(sample)?;
        active.session.event_count += 1;

        let event = DrivingEvent {
            kind,
            session_id: active.session.id.clone(),
            timestamp: sample.timestamp,
            location: self.last_position,
            metrics,
        };
        tracing::info!(session = %event.session_id, kind = %event.kind, metrics = ?event.metrics, "Driving event");
        Some(event)
    }
}
