//! Event loop that owns a [`MotionClassifier`].

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::classifier::{MotionClassifier, MotionConfig};
use super::types::{MotionInput, MotionState, MotionTransition};
use crate::error::ConfigError;
use crate::ports::SignalSource;

/// Default capacity of the transition broadcast channel.
pub const DEFAULT_TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Maps sample timestamps onto the runtime clock.
///
/// Confirmation windows are measured on sample time. Between samples the
/// service extrapolates from the newest sample using elapsed runtime time, so
/// a pending timer fires when the window would complete in sample time.
#[derive(Debug, Default)]
struct SampleClock {
    anchor: Option<(DateTime<Utc>, Instant)>,
}

impl SampleClock {
    fn observe(&mut self, timestamp: DateTime<Utc>) {
        match self.anchor {
            Some((latest, _)) if latest > timestamp => {}
            _ => self.anchor = Some((timestamp, Instant::now())),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        match self.anchor {
            Some((timestamp, at)) => chrono::Duration::from_std(at.elapsed())
                .ok()
                .and_then(|elapsed| timestamp.checked_add_signed(elapsed))
                .unwrap_or(timestamp),
            None => Utc::now(),
        }
    }

    fn instant_at(&self, deadline: DateTime<Utc>) -> Instant {
        match self.anchor {
            Some((timestamp, at)) => at + (deadline - timestamp).to_std().unwrap_or_default(),
            None => Instant::now() + (deadline - Utc::now()).to_std().unwrap_or_default(),
        }
    }
}

/// Motion classification service (init stage).
///
/// ```ignore
/// let service = MotionService::new(MotionConfig::default())?;
/// let mut transitions = service.subscribe();
/// let handle = service.start(input_rx);
/// // ...
/// handle.stop().await;
/// ```
pub struct MotionService {
    classifier: MotionClassifier,
    transitions: broadcast::Sender<MotionTransition>,
    state_tx: watch::Sender<MotionState>,
}

impl MotionService {
    pub fn new(config: MotionConfig) -> Result<Self, ConfigError> {
        let classifier = MotionClassifier::new(config)?;
        let (transitions, _) = broadcast::channel(DEFAULT_TRANSITION_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(classifier.current_state());
        Ok(Self {
            classifier,
            transitions,
            state_tx,
        })
    }

    /// Subscribe to confirmed transitions. Subscribe before `start` to see
    /// every transition.
    pub fn subscribe(&self) -> broadcast::Receiver<MotionTransition> {
        self.transitions.subscribe()
    }

    /// Spawn the processing loop. Must be called inside a Tokio runtime.
    pub fn start<S>(self, source: S) -> MotionHandle
    where
        S: SignalSource<MotionInput> + 'static,
    {
        let cancellation = CancellationToken::new();
        let state_rx = self.state_tx.subscribe();
        let transitions = self.transitions.clone();

        let task = tokio::spawn(self.run(source, cancellation.clone()));

        MotionHandle {
            state_rx,
            transitions,
            cancellation,
            task,
        }
    }

    async fn run<S>(mut self, mut source: S, cancellation: CancellationToken)
    where
        S: SignalSource<MotionInput>,
    {
        tracing::info!("Motion classifier started");
        let mut clock = SampleClock::default();

        loop {
            let deadline = self.classifier.pending_deadline();
            let timer = sleep_until_deadline(deadline.map(|d| clock.instant_at(d)));

            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                input = source.next() => {
                    let Some(input) = input else { break };
                    match &input {
                        MotionInput::Motion(sample) => clock.observe(sample.timestamp),
                        MotionInput::Position(sample) => clock.observe(sample.timestamp),
                        MotionInput::SensorFault(_) => {}
                    }
                    if let Some(transition) = self.classifier.ingest(input) {
                        self.publish(transition);
                    }
                }

                _ = timer => {
                    let now = match deadline {
                        Some(deadline) => clock.now().max(deadline),
                        None => clock.now(),
                    };
                    if let Some(transition) = self.classifier.tick(now) {
                        self.publish(transition);
                    }
                }
            }
        }

        tracing::info!(state = %self.classifier.current_state(), "Motion classifier stopped");
    }

    fn publish(&self, transition: MotionTransition) {
        self.state_tx.send_replace(transition.to);
        // No subscribers is fine
        let _ = self.transitions.send(transition);
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to a running [`MotionService`].
pub struct MotionHandle {
    state_rx: watch::Receiver<MotionState>,
    transitions: broadcast::Sender<MotionTransition>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl MotionHandle {
    pub fn current_state(&self) -> MotionState {
        *self.state_rx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<MotionState> {
        self.state_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MotionTransition> {
        self.transitions.subscribe()
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// Pending confirmation timers are dropped with the loop; once this
    /// returns no further transitions are published.
    pub async fn stop(self) {
        self.cancellation.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Motion classifier task ended abnormally");
        }
    }
}
