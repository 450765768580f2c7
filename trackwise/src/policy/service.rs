//! Event loop that owns the current [`PolicyInputs`].

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::engine::{PolicyConfig, PolicyEngine, PolicyInputs, ProfileTracker};
use super::profile::{SamplingMode, TrackingProfile};
use super::signals::{AppState, NetworkQuality, PowerReading};
use crate::error::ConfigError;
use crate::geo::GeoPoint;
use crate::motion::MotionState;
use crate::ports::SignalSource;

/// Default capacity of the profile change broadcast channel.
pub const DEFAULT_PROFILE_CHANNEL_CAPACITY: usize = 32;

/// A typed update from one of the policy's signal sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicySignal {
    Motion(MotionState),
    Power(PowerReading),
    App(AppState),
    /// `None` when quality cannot be measured.
    Network(Option<NetworkQuality>),
    BackgroundLimited(bool),
    RealtimeRequested(bool),
    /// Latest known position; anchors the composite-mode proximity region.
    Location(GeoPoint),
}

/// Emitted whenever the evaluated profile differs from the last applied one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileChange {
    pub previous: TrackingProfile,
    pub current: TrackingProfile,
    pub inputs: PolicyInputs,
    pub at: DateTime<Utc>,
}

fn apply_signal(inputs: &mut PolicyInputs, signal: PolicySignal) {
    match signal {
        PolicySignal::Motion(state) => inputs.motion = state,
        PolicySignal::Power(reading) => {
            inputs.battery = reading.battery_level();
            inputs.thermal = reading.thermal;
        }
        PolicySignal::App(state) => inputs.app = Some(state),
        PolicySignal::Network(quality) => inputs.network = quality,
        PolicySignal::BackgroundLimited(limited) => inputs.background_limited = limited,
        PolicySignal::RealtimeRequested(requested) => inputs.realtime_requested = requested,
        // Not an evaluation input; the service keeps it
        PolicySignal::Location(_) => {}
    }
}

/// Policy evaluation service (init stage).
pub struct PolicyService {
    engine: PolicyEngine,
    inputs: PolicyInputs,
    last_point: Option<GeoPoint>,
    tracker: ProfileTracker,
    changes: broadcast::Sender<ProfileChange>,
    profile_tx: watch::Sender<TrackingProfile>,
}

impl PolicyService {
    pub fn new(config: PolicyConfig) -> Result<Self, ConfigError> {
        let engine = PolicyEngine::new(config)?;
        let inputs = PolicyInputs::default();
        let initial = engine.evaluate(&inputs);
        let (changes, _) = broadcast::channel(DEFAULT_PROFILE_CHANNEL_CAPACITY);
        let (profile_tx, _) = watch::channel(initial);

        Ok(Self {
            engine,
            inputs,
            last_point: None,
            tracker: ProfileTracker::new(initial),
            changes,
            profile_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProfileChange> {
        self.changes.subscribe()
    }

    pub fn current_profile(&self) -> TrackingProfile {
        *self.tracker.last_applied()
    }

    /// Spawn the processing loop. Must be called inside a Tokio runtime.
    pub fn start<S>(self, source: S) -> PolicyHandle
    where
        S: SignalSource<PolicySignal> + 'static,
    {
        let cancellation = CancellationToken::new();
        let profile_rx = self.profile_tx.subscribe();
        let changes = self.changes.clone();

        let task = tokio::spawn(self.run(source, cancellation.clone()));

        PolicyHandle {
            profile_rx,
            changes,
            cancellation,
            task,
        }
    }

    async fn run<S>(mut self, mut source: S, cancellation: CancellationToken)
    where
        S: SignalSource<PolicySignal>,
    {
        let period = self.engine.config().reevaluate_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut source_open = true;

        tracing::info!(
            profile = %self.tracker.last_applied(),
            reevaluate_secs = period.as_secs(),
            "Policy engine started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                signal = source.next(), if source_open => {
                    match signal {
                        Some(PolicySignal::Location(point)) => self.on_location(point),
                        Some(signal) => {
                            tracing::trace!(?signal, "Policy signal");
                            apply_signal(&mut self.inputs, signal);
                            self.reevaluate();
                        }
                        None => {
                            tracing::debug!("Policy signal source closed");
                            source_open = false;
                        }
                    }
                }

                _ = ticker.tick() => self.reevaluate(),
            }
        }

        tracing::info!("Policy engine stopped");
    }

    /// Re-anchor an applied composite profile once the device leaves its
    /// proximity region.
    fn on_location(&mut self, point: GeoPoint) {
        self.last_point = Some(point);
        if self.tracker.last_applied().is_composite() {
            self.reevaluate();
        }
    }

    /// Centre a composite profile on the last known point, keeping the
    /// applied centre while that point is still inside its radius.
    fn anchor(&self, profile: &mut TrackingProfile) {
        let SamplingMode::Composite(strategy) = &mut profile.mode else {
            return;
        };
        let applied = match self.tracker.last_applied().mode {
            SamplingMode::Composite(applied) => applied.center,
            SamplingMode::Continuous => None,
        };
        strategy.center = match (applied, self.last_point) {
            (Some(center), Some(point)) if center.distance_to(&point) <= strategy.geofence_radius_m => {
                Some(center)
            }
            (_, Some(point)) => Some(point),
            (applied, None) => applied,
        };
    }

    fn reevaluate(&mut self) {
        let mut profile = self.engine.evaluate(&self.inputs);
        self.anchor(&mut profile);
        tracing::debug!(inputs = ?self.inputs, %profile, "Evaluated tracking profile");

        let previous = *self.tracker.last_applied();
        if let Some(current) = self.tracker.offer(profile) {
            tracing::info!(from = %previous.tier, to = %current.tier, "Tracking profile changed");
            self.profile_tx.send_replace(current);
            let _ = self.changes.send(ProfileChange {
                previous,
                current,
                inputs: self.inputs,
                at: Utc::now(),
            });
        }
    }
}

/// Handle to a running [`PolicyService`].
pub struct PolicyHandle {
    profile_rx: watch::Receiver<TrackingProfile>,
    changes: broadcast::Sender<ProfileChange>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl PolicyHandle {
    pub fn current_profile(&self) -> TrackingProfile {
        *self.profile_rx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<TrackingProfile> {
        self.profile_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProfileChange> {
        self.changes.subscribe()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.cancellation.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Policy task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{BatteryLevel, ProfileTier, ThermalState};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_power_signal_updates_battery_and_thermal() {
        let mut inputs = PolicyInputs::default();
        apply_signal(
            &mut inputs,
            PolicySignal::Power(PowerReading {
                battery_percent: Some(8.0),
                charging: false,
                thermal: Some(ThermalState::Fair),
            }),
        );
        assert_eq!(inputs.battery, Some(BatteryLevel::Critical));
        assert_eq!(inputs.thermal, Some(ThermalState::Fair));

        // Lost reading falls back to unknown
        apply_signal(&mut inputs, PolicySignal::Power(PowerReading::default()));
        assert_eq!(inputs.battery, None);
    }

    #[tokio::test]
    async fn test_changes_broadcast_in_order() {
        let service = PolicyService::new(PolicyConfig::default()).unwrap();
        let mut changes = service.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.start(rx);

        tx.send(PolicySignal::Motion(MotionState::Driving)).await.unwrap();
        tx.send(PolicySignal::Power(PowerReading {
            battery_percent: Some(5.0),
            charging: false,
            thermal: None,
        }))
        .await
        .unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.previous.tier, ProfileTier::Balanced);
        assert_eq!(first.current.tier, ProfileTier::HighPerformance);

        let second = changes.recv().await.unwrap();
        assert_eq!(second.previous.tier, ProfileTier::HighPerformance);
        assert_eq!(second.current.tier, ProfileTier::UltraPowerSaver);
        assert_eq!(handle.current_profile().tier, ProfileTier::UltraPowerSaver);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_identical_profile_not_rebroadcast() {
        let service = PolicyService::new(PolicyConfig::default()).unwrap();
        let mut changes = service.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.start(rx);

        // Walking maps to the balanced tier, but min distance doubles
        tx.send(PolicySignal::Motion(MotionState::Walking)).await.unwrap();
        tx.send(PolicySignal::Motion(MotionState::Walking)).await.unwrap();
        tx.send(PolicySignal::App(AppState::Background)).await.unwrap();
        tx.send(PolicySignal::Motion(MotionState::Driving)).await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.current.tier, ProfileTier::Balanced);
        let second = changes.recv().await.unwrap();
        assert_eq!(second.current.tier, ProfileTier::HighPerformance);
        assert!(changes.try_recv().is_err());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_composite_fence_follows_device() {
        let service = PolicyService::new(PolicyConfig::default()).unwrap();
        let mut changes = service.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.start(rx);

        let home = GeoPoint::new(53.55, 9.99);
        // Known before composite mode starts
        tx.send(PolicySignal::Location(home)).await.unwrap();
        tx.send(PolicySignal::App(AppState::Background)).await.unwrap();
        tx.send(PolicySignal::BackgroundLimited(true)).await.unwrap();

        let center_of = |change: &ProfileChange| match change.current.mode {
            SamplingMode::Composite(strategy) => strategy.center,
            other => panic!("expected composite, got {:?}", other),
        };
        let entered = loop {
            let change = changes.recv().await.unwrap();
            if change.current.is_composite() {
                break change;
            }
        };
        assert_eq!(center_of(&entered), Some(home));

        // About 11 m away stays inside the fence, 5.5 km away moves it
        tx.send(PolicySignal::Location(GeoPoint::new(53.5501, 9.99))).await.unwrap();
        let away = GeoPoint::new(53.60, 9.99);
        tx.send(PolicySignal::Location(away)).await.unwrap();

        let moved = changes.recv().await.unwrap();
        assert_eq!(moved.current.tier, entered.current.tier);
        assert_eq!(center_of(&moved), Some(away));
        assert!(changes.try_recv().is_err());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_changes() {
        let service = PolicyService::new(PolicyConfig::default()).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.start(rx);
        let profile = handle.watch();

        handle.stop().await;
        assert!(tx.send(PolicySignal::Motion(MotionState::Driving)).await.is_err());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(profile.borrow().tier, ProfileTier::Balanced);
    }
}
