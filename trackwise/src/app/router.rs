//! Fan-out between platform sources and the engine services.
//!
//! ```text
//! positions ────┬──► motion   (MotionInput::Position)
//!               ├──► driving  (DrivingInput::Position)
//!               ├──► policy   (PolicySignal::Location)
//!               └──► sync     (Normal priority, tagged with motion state)
//! sensors ──────┬──► motion
//!               └──► driving  (motion readings only)
//! transitions ──┬──► driving  (DrivingInput::Transition)
//!               └──► policy   (PolicySignal::Motion)
//! connectivity ─┬──► sync
//!               └──► policy   (PolicySignal::Network)
//! signals ──────────► policy
//! driving ──────────► sync     (events High, session boundaries Critical)
//! ```
//!
//! A fix that triggers a driving event or bounds a session is sent again at
//! the higher priority; the sync queue keeps only that copy while the first
//! is still pending. On cancellation, driving notifications already published
//! are still turned into sync items before the router exits.

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::driving::{DrivingInput, DrivingNotification};
use crate::motion::{MotionInput, MotionState, MotionTransition, PositionSample};
use crate::policy::PolicySignal;
use crate::ports::SignalSource;
use crate::sync::{ConnectivityState, LocationPayload, SyncItem, SyncPriority};

type Source<T> = Option<Box<dyn SignalSource<T>>>;

/// Platform-facing inputs of a [`TrackingEngine`](super::TrackingEngine).
///
/// Every source is optional; a missing or closed source simply stops
/// contributing.
#[derive(Default)]
pub struct EngineSources {
    pub(super) positions: Source<PositionSample>,
    pub(super) sensors: Source<MotionInput>,
    pub(super) connectivity: Source<ConnectivityState>,
    pub(super) signals: Source<PolicySignal>,
}

impl EngineSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position fixes from the location provider.
    pub fn with_positions(mut self, source: impl SignalSource<PositionSample> + 'static) -> Self {
        self.positions = Some(Box::new(source));
        self
    }

    /// Motion-sensor readings and sensor faults.
    pub fn with_sensors(mut self, source: impl SignalSource<MotionInput> + 'static) -> Self {
        self.sensors = Some(Box::new(source));
        self
    }

    pub fn with_connectivity(mut self, source: impl SignalSource<ConnectivityState> + 'static) -> Self {
        self.connectivity = Some(Box::new(source));
        self
    }

    /// Power, lifecycle and platform-capability signals for the policy.
    pub fn with_signals(mut self, source: impl SignalSource<PolicySignal> + 'static) -> Self {
        self.signals = Some(Box::new(source));
        self
    }
}

/// Service inputs the router feeds.
pub(super) struct Outlets {
    pub motion: mpsc::UnboundedSender<MotionInput>,
    pub driving: mpsc::UnboundedSender<DrivingInput>,
    pub policy: mpsc::UnboundedSender<PolicySignal>,
    pub items: mpsc::UnboundedSender<SyncItem>,
    pub connectivity: mpsc::UnboundedSender<ConnectivityState>,
}

/// Service outputs the router listens to.
pub(super) struct Feedback {
    pub transitions: broadcast::Receiver<MotionTransition>,
    pub driving: broadcast::Receiver<DrivingNotification>,
    pub motion_state: watch::Receiver<MotionState>,
}

async fn next_from<T>(source: &mut Source<T>) -> Option<T> {
    match source {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}

/// Receive from a broadcast channel, skipping over lag.
async fn next_broadcast<T: Clone>(rx: &mut Option<broadcast::Receiver<T>>, channel: &str) -> Option<T> {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(value) => return Some(value),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(channel, skipped, "Router fell behind, notifications skipped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

pub(super) async fn run(
    mut sources: EngineSources,
    outlets: Outlets,
    feedback: Feedback,
    cancellation: CancellationToken,
) {
    let Feedback {
        transitions,
        driving,
        motion_state,
    } = feedback;
    let mut transitions = Some(transitions);
    let mut driving = Some(driving);

    loop {
        tokio::select! {
            biased;

            _ = cancellation.cancelled() => break,

            transition = next_broadcast(&mut transitions, "motion") => match transition {
                Some(transition) => {
                    let _ = outlets.driving.send(DrivingInput::Transition(transition));
                    let _ = outlets.policy.send(PolicySignal::Motion(transition.to));
                }
                None => transitions = None,
            },

            notification = next_broadcast(&mut driving, "driving") => match notification {
                Some(notification) => {
                    for item in items_for(&notification) {
                        let _ = outlets.items.send(item);
                    }
                }
                None => driving = None,
            },

            fix = next_from(&mut sources.positions) => match fix {
                Some(fix) => {
                    let state = *motion_state.borrow();
                    let _ = outlets.motion.send(MotionInput::Position(fix));
                    let _ = outlets.driving.send(DrivingInput::Position(fix));
                    let _ = outlets.policy.send(PolicySignal::Location(fix.point()));
                    let _ = outlets.items.send(SyncItem::new(
                        LocationPayload::from_sample(&fix, Some(state)),
                        SyncPriority::Normal,
                    ));
                }
                None => sources.positions = None,
            },

            input = next_from(&mut sources.sensors) => match input {
                Some(input) => {
                    if let MotionInput::Motion(sample) = &input {
                        let _ = outlets.driving.send(DrivingInput::Motion(*sample));
                    }
                    let _ = outlets.motion.send(input);
                }
                None => sources.sensors = None,
            },

            reading = next_from(&mut sources.connectivity) => match reading {
                Some(reading) => {
                    let quality = reading.is_online().then_some(reading.quality).flatten();
                    let _ = outlets.policy.send(PolicySignal::Network(quality));
                    let _ = outlets.connectivity.send(reading);
                }
                None => sources.connectivity = None,
            },

            signal = next_from(&mut sources.signals) => match signal {
                Some(signal) => {
                    let _ = outlets.policy.send(signal);
                }
                None => sources.signals = None,
            },
        }
    }

    // Session boundaries published while the engine stops still get queued
    if let Some(mut driving) = driving {
        loop {
            match driving.try_recv() {
                Ok(notification) => {
                    for item in items_for(&notification) {
                        let _ = outlets.items.send(item);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    tracing::debug!("Engine router stopped");
}

/// Sync items derived from a driving notification.
fn items_for(notification: &DrivingNotification) -> Vec<SyncItem> {
    match notification {
        DrivingNotification::Event(event) => event
            .location
            .iter()
            .map(|fix| {
                SyncItem::new(
                    LocationPayload::from_sample(fix, Some(MotionState::Driving)),
                    SyncPriority::High,
                )
            })
            .collect(),
        DrivingNotification::StateChanged { is_active, session } => {
            let boundary = if *is_active {
                session.start_location
            } else {
                session.end_location
            };
            boundary
                .iter()
                .map(|fix| {
                    SyncItem::new(
                        LocationPayload::from_sample(fix, Some(MotionState::Driving)),
                        SyncPriority::Critical,
                    )
                })
                .collect()
        }
    }
}
