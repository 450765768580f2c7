//! Driving session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::motion::PositionSample;

/// Identifier of a driving session, unique per tracked identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Builds `<user>-<start millis>-<sequence>`.
    pub fn generate(user_ref: &str, started_at: DateTime<Utc>, sequence: u64) -> Self {
        Self(format!(
            "{}-{}-{}",
            user_ref,
            started_at.timestamp_millis(),
            sequence
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One trip between a confirmed driving start and a confirmed stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingSession {
    pub id: SessionId,
    pub user_ref: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Most recent position when the session started, if any was known.
    pub start_location: Option<PositionSample>,
    pub end_location: Option<PositionSample>,
    pub route: Vec<PositionSample>,
    /// Geodesic length of the route (m).
    pub distance_m: f64,
    /// m/s
    pub max_speed: f64,
    /// Distance over duration (m/s); set when the session ends.
    pub average_speed: f64,
    pub event_count: u32,
    pub is_active: bool,
}

impl DrivingSession {
    pub fn start(
        id: SessionId,
        user_ref: impl Into<String>,
        start_time: DateTime<Utc>,
        start_location: Option<PositionSample>,
    ) -> Self {
        let max_speed = start_location
            .as_ref()
            .and_then(PositionSample::reported_speed)
            .unwrap_or(0.0);
        Self {
            id,
            user_ref: user_ref.into(),
            start_time,
            end_time: None,
            start_location,
            end_location: None,
            route: start_location.into_iter().collect(),
            distance_m: 0.0,
            max_speed,
            average_speed: 0.0,
            event_count: 0,
            is_active: true,
        }
    }

    /// Elapsed time to the end, or to `now` while active.
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).max(chrono::Duration::zero())
    }

    /// Append a fix and extend distance and max speed; returns the segment
    /// length in meters.
    pub(crate) fn extend_route(&mut self, sample: PositionSample, speed: Option<f64>) -> f64 {
        let segment = self
            .route
            .last()
            .map(|previous| previous.distance_to(&sample))
            .unwrap_or(0.0);
        self.distance_m += segment;
        if let Some(speed) = speed {
            self.max_speed = self.max_speed.max(speed);
        }
        self.route.push(sample);
        segment
    }

    /// Close the session. `end_time` is clamped to `start_time`.
    pub(crate) fn finish(&mut self, end_time: DateTime<Utc>, end_location: Option<PositionSample>) {
        let end_time = end_time.max(self.start_time);
        self.end_time = Some(end_time);
        self.end_location = end_location;
        self.is_active = false;

        let secs = (end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.average_speed = if secs > 0.0 {
            self.distance_m / secs
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fix(lat: f64, speed: f64, at: DateTime<Utc>) -> PositionSample {
        PositionSample::new(lat, 10.0, speed, 5.0, at)
    }

    #[test]
    fn test_session_id_format() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let id = SessionId::generate("alice", at, 3);
        assert_eq!(id.as_str(), "alice-1700000000000-3");
    }

    #[test]
    fn test_start_seeds_route_with_start_location() {
        let t0 = Utc::now();
        let session = DrivingSession::start("s".into(), "u", t0, Some(fix(53.0, 12.0, t0)));
        assert!(session.is_active);
        assert_eq!(session.route.len(), 1);
        assert_eq!(session.max_speed, 12.0);
    }

    #[test]
    fn test_extend_and_finish() {
        let t0 = Utc::now();
        let mut session = DrivingSession::start("s".into(), "u", t0, Some(fix(53.0, 10.0, t0)));

        // 0.01° latitude ≈ 1112 m
        let end = fix(53.01, 20.0, t0 + Duration::seconds(100));
        let segment = session.extend_route(end, Some(20.0));
        assert!((segment - 1112.0).abs() < 2.0);
        assert_eq!(session.max_speed, 20.0);

        session.finish(t0 + Duration::seconds(100), Some(end));
        assert!(!session.is_active);
        assert!((session.average_speed - session.distance_m / 100.0).abs() < 1e-9);
        assert_eq!(session.duration(Utc::now()), Duration::seconds(100));
    }

    #[test]
    fn test_end_time_never_before_start() {
        let t0 = Utc::now();
        let mut session = DrivingSession::start("s".into(), "u", t0, None);
        session.finish(t0 - Duration::seconds(5), None);
        assert_eq!(session.end_time, Some(t0));
        assert_eq!(session.average_speed, 0.0);
    }

    #[test]
    fn test_session_json_shape() {
        let t0 = Utc::now();
        let session = DrivingSession::start("abc".into(), "u", t0, None);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["is_active"], true);
    }
}
