//! Event loop that owns a [`DrivingSessionTracker`].
//!
//! Finished sessions are handed to the [`SessionStore`] from the loop itself;
//! tracker state is owned by the task, so nothing is locked across the write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::DrivingEvent;
use super::session::{DrivingSession, SessionId};
use super::tracker::{DrivingConfig, DrivingSessionTracker, LifecycleChange, StartOutcome};
use crate::error::ConfigError;
use crate::motion::{MotionSample, MotionTransition, PositionSample};
use crate::ports::{SessionStore, SignalSource};

/// Default capacity of the notification broadcast channel.
pub const DEFAULT_NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Input to the driving service, processed in arrival order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrivingInput {
    /// A confirmed transition from the motion classifier.
    Transition(MotionTransition),
    Position(PositionSample),
    Motion(MotionSample),
}

impl From<MotionTransition> for DrivingInput {
    fn from(transition: MotionTransition) -> Self {
        DrivingInput::Transition(transition)
    }
}

impl From<PositionSample> for DrivingInput {
    fn from(sample: PositionSample) -> Self {
        DrivingInput::Position(sample)
    }
}

impl From<MotionSample> for DrivingInput {
    fn from(sample: MotionSample) -> Self {
        DrivingInput::Motion(sample)
    }
}

/// Published by the driving service.
#[derive(Debug, Clone, PartialEq)]
pub enum DrivingNotification {
    Event(DrivingEvent),
    /// A session started (`is_active`) or finished.
    StateChanged {
        is_active: bool,
        session: DrivingSession,
    },
}

enum Command {
    Start {
        at: DateTime<Utc>,
        reply: oneshot::Sender<StartOutcome>,
    },
    Stop {
        at: DateTime<Utc>,
        reply: oneshot::Sender<Option<SessionId>>,
    },
}

#[derive(Debug, Default)]
struct StoreCounters {
    saved: AtomicU64,
    failed: AtomicU64,
}

impl StoreCounters {
    fn snapshot(&self) -> StoreStats {
        StoreStats {
            saved: self.saved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Outcome counts of session hand-offs to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub saved: u64,
    pub failed: u64,
}

/// Driving session service (init stage).
pub struct DrivingService {
    tracker: DrivingSessionTracker,
    store: Arc<dyn SessionStore>,
    notifications: broadcast::Sender<DrivingNotification>,
    active_tx: watch::Sender<Option<SessionId>>,
    counters: Arc<StoreCounters>,
}

impl DrivingService {
    pub fn new(
        config: DrivingConfig,
        user_ref: impl Into<String>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ConfigError> {
        let tracker = DrivingSessionTracker::new(config, user_ref)?;
        let (notifications, _) = broadcast::channel(DEFAULT_NOTIFICATION_CHANNEL_CAPACITY);
        let (active_tx, _) = watch::channel(None);

        Ok(Self {
            tracker,
            store,
            notifications,
            active_tx,
            counters: Arc::new(StoreCounters::default()),
        })
    }

    /// Subscribe before `start` to see every notification.
    pub fn subscribe(&self) -> broadcast::Receiver<DrivingNotification> {
        self.notifications.subscribe()
    }

    /// Spawn the processing loop. Must be called inside a Tokio runtime.
    pub fn start<S>(self, source: S) -> DrivingHandle
    where
        S: SignalSource<DrivingInput> + 'static,
    {
        let cancellation = CancellationToken::new();
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let active_rx = self.active_tx.subscribe();
        let notifications = self.notifications.clone();
        let counters = Arc::clone(&self.counters);

        let task = tokio::spawn(self.run(source, command_rx, cancellation.clone()));

        DrivingHandle {
            commands,
            active_rx,
            notifications,
            counters,
            cancellation,
            task,
        }
    }

    async fn run<S>(
        mut self,
        mut source: S,
        mut commands: mpsc::Receiver<Command>,
        cancellation: CancellationToken,
    ) where
        S: SignalSource<DrivingInput>,
    {
        tracing::info!(user = %self.tracker.user_ref(), "Driving session tracker started");
        let mut source_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                command = commands.recv() => {
                    // The handle owns the sender; it is gone only after stop
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }

                input = source.next(), if source_open => {
                    match input {
                        Some(input) => self.handle_input(input).await,
                        None => {
                            tracing::debug!("Driving input source closed");
                            source_open = false;
                        }
                    }
                }
            }
        }

        // Close out a trip still running so it is not lost
        if let Some(session) = self.tracker.stop(Utc::now()) {
            self.finish(session).await;
        }
        tracing::info!("Driving session tracker stopped");
    }

    async fn handle_input(&mut self, input: DrivingInput) {
        match input {
            DrivingInput::Transition(transition) => match self.tracker.on_transition(&transition) {
                Some(LifecycleChange::Started(session)) => self.started(session),
                Some(LifecycleChange::Finished(session)) => self.finish(session).await,
                None => {}
            },
            DrivingInput::Position(sample) => {
                for event in self.tracker.on_position(sample) {
                    self.notify(DrivingNotification::Event(event));
                }
            }
            DrivingInput::Motion(sample) => {
                if let Some(event) = self.tracker.on_motion(&sample) {
                    self.notify(DrivingNotification::Event(event));
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { at, reply } => {
                let outcome = self.tracker.start(at);
                if matches!(outcome, StartOutcome::Started(_)) {
                    if let Some(session) = self.tracker.active_session().cloned() {
                        self.started(session);
                    }
                }
                let _ = reply.send(outcome);
            }
            Command::Stop { at, reply } => {
                let stopped = match self.tracker.stop(at) {
                    Some(session) => {
                        let id = session.id.clone();
                        self.finish(session).await;
                        Some(id)
                    }
                    None => None,
                };
                let _ = reply.send(stopped);
            }
        }
    }

    fn started(&self, session: DrivingSession) {
        self.active_tx.send_replace(Some(session.id.clone()));
        self.notify(DrivingNotification::StateChanged {
            is_active: true,
            session,
        });
    }

    async fn finish(&self, session: DrivingSession) {
        self.active_tx.send_replace(None);

        match self.store.save(&session).await {
            Ok(()) => {
                self.counters.saved.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(session = %session.id, error = %e, "Failed to store driving session");
            }
        }

        self.notify(DrivingNotification::StateChanged {
            is_active: false,
            session,
        });
    }

    fn notify(&self, notification: DrivingNotification) {
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }
}

/// Handle to a running [`DrivingService`].
pub struct DrivingHandle {
    commands: mpsc::Sender<Command>,
    active_rx: watch::Receiver<Option<SessionId>>,
    notifications: broadcast::Sender<DrivingNotification>,
    counters: Arc<StoreCounters>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl DrivingHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<DrivingNotification> {
        self.notifications.subscribe()
    }

    /// Id of the running session, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.active_rx.borrow().clone()
    }

    pub fn watch_active(&self) -> watch::Receiver<Option<SessionId>> {
        self.active_rx.clone()
    }

    /// Start a session manually. Idempotent while a session is running.
    ///
    /// Returns `None` if the service has stopped.
    pub async fn start_session(&self, at: DateTime<Utc>) -> Option<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Start { at, reply }).await.ok()?;
        rx.await.ok()
    }

    /// Finish the running session manually and hand it to the store.
    pub async fn stop_session(&self, at: DateTime<Utc>) -> Option<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Stop { at, reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.counters.snapshot()
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// A session still running is finished and stored before this returns.
    pub async fn stop(self) -> StoreStats {
        self.cancellation.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Driving task ended abnormally");
        }
        self.counters.snapshot()
    }
}
