//! Engine bootstrap and lifecycle.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::router::{self, EngineSources, Feedback, Outlets};
use crate::config::EngineConfig;
use crate::driving::{
    DrivingHandle, DrivingNotification, DrivingService, SessionId, StartOutcome, StoreStats,
};
use crate::error::ConfigError;
use crate::motion::{MotionHandle, MotionService, MotionState, MotionTransition};
use crate::policy::{PolicyHandle, PolicyService, ProfileChange, TrackingProfile};
use crate::ports::{SessionStore, SyncTransport};
use crate::sync::{SyncHandle, SyncService};
use crate::telemetry::SyncStats;

/// The four services, constructed and validated but not yet running.
///
/// Subscribe to the outputs you need before calling [`start`](Self::start)
/// so nothing published at startup is missed.
///
/// ```ignore
/// let engine = TrackingEngine::new(&config, "driver-1", transport, store)?;
/// let mut profiles = engine.subscribe_profiles();
/// let handle = engine.start(EngineSources::new().with_positions(fix_rx));
/// // ...
/// let report = handle.stop().await;
/// ```
pub struct TrackingEngine {
    motion: MotionService,
    policy: PolicyService,
    sync: SyncService,
    driving: DrivingService,
}

impl TrackingEngine {
    /// Validate `config` and construct every service.
    pub fn new(
        config: &EngineConfig,
        user_ref: impl Into<String>,
        transport: Arc<dyn SyncTransport>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            motion: MotionService::new(config.motion.clone())?,
            policy: PolicyService::new(config.policy.clone())?,
            sync: SyncService::new(config.sync.clone(), transport)?,
            driving: DrivingService::new(config.driving.clone(), user_ref, store)?,
        })
    }

    pub fn subscribe_motion(&self) -> broadcast::Receiver<MotionTransition> {
        self.motion.subscribe()
    }

    pub fn subscribe_profiles(&self) -> broadcast::Receiver<ProfileChange> {
        self.policy.subscribe()
    }

    pub fn subscribe_driving(&self) -> broadcast::Receiver<DrivingNotification> {
        self.driving.subscribe()
    }

    /// Start every service and the router. Must be called inside a Tokio
    /// runtime.
    pub fn start(self, sources: EngineSources) -> EngineHandle {
        let (motion_tx, motion_rx) = mpsc::unbounded_channel();
        let (driving_tx, driving_rx) = mpsc::unbounded_channel();
        let (policy_tx, policy_rx) = mpsc::unbounded_channel();
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        let (connectivity_tx, connectivity_rx) = mpsc::unbounded_channel();

        // Router subscriptions must exist before the services publish
        let transitions = self.motion.subscribe();
        let driving_notifications = self.driving.subscribe();

        let sync = self.sync.start(items_rx, connectivity_rx);
        let driving = self.driving.start(driving_rx);
        let policy = self.policy.start(policy_rx);
        let motion = self.motion.start(motion_rx);
        info!("Engine services started");

        let cancellation = CancellationToken::new();
        let router = tokio::spawn(router::run(
            sources,
            Outlets {
                motion: motion_tx,
                driving: driving_tx,
                policy: policy_tx,
                items: items_tx,
                connectivity: connectivity_tx,
            },
            Feedback {
                transitions,
                driving: driving_notifications,
                motion_state: motion.watch(),
            },
            cancellation.clone(),
        ));

        EngineHandle {
            motion,
            policy,
            sync,
            driving,
            router,
            cancellation,
        }
    }
}

/// Final counters returned by [`EngineHandle::stop`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    pub motion_state: MotionState,
    pub profile: TrackingProfile,
    pub sync: SyncStats,
    pub sessions: StoreStats,
}

/// Handle to a running [`TrackingEngine`].
pub struct EngineHandle {
    motion: MotionHandle,
    policy: PolicyHandle,
    sync: SyncHandle,
    driving: DrivingHandle,
    router: JoinHandle<()>,
    cancellation: CancellationToken,
}

impl EngineHandle {
    pub fn motion_state(&self) -> MotionState {
        self.motion.current_state()
    }

    pub fn watch_motion(&self) -> watch::Receiver<MotionState> {
        self.motion.watch()
    }

    pub fn profile(&self) -> TrackingProfile {
        self.policy.current_profile()
    }

    pub fn watch_profile(&self) -> watch::Receiver<TrackingProfile> {
        self.policy.watch()
    }

    pub fn subscribe_motion(&self) -> broadcast::Receiver<MotionTransition> {
        self.motion.subscribe()
    }

    pub fn subscribe_profiles(&self) -> broadcast::Receiver<ProfileChange> {
        self.policy.subscribe()
    }

    pub fn subscribe_driving(&self) -> broadcast::Receiver<DrivingNotification> {
        self.driving.subscribe()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Flush queued items until a flush sends nothing.
    ///
    /// Stops early when the pipeline is offline or cooling down.
    pub async fn drain_sync(&self) {
        let pipeline = self.sync.pipeline();
        while pipeline.flush(pipeline.config().max_batch).await.is_sent() {}
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.driving.active_session()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.driving.store_stats()
    }

    /// Start a driving session without waiting for the classifier.
    pub async fn start_session(&self) -> Option<StartOutcome> {
        self.driving.start_session(chrono::Utc::now()).await
    }

    pub async fn stop_session(&self) -> Option<SessionId> {
        self.driving.stop_session(chrono::Utc::now()).await
    }

    /// Stop every service, upstream of sync first.
    ///
    /// Driving stops while the router still runs, so a session it closes
    /// out reaches the sync queue. Once this returns no service mutates
    /// state; a running driving session has been finished and stored.
    pub async fn stop(self) -> EngineReport {
        let motion_state = self.motion.current_state();
        self.motion.stop().await;
        let sessions = self.driving.stop().await;

        self.cancellation.cancel();
        if let Err(e) = self.router.await {
            tracing::warn!(error = %e, "Engine router ended abnormally");
        }

        let profile = self.policy.current_profile();
        self.policy.stop().await;

        let sync = self.sync.stop().await;
        info!(
            delivered = sync.items_delivered,
            dropped = sync.items_dropped,
            pending = sync.pending,
            sessions_saved = sessions.saved,
            "Engine stopped"
        );

        EngineReport {
            motion_state,
            profile,
            sync,
            sessions,
        }
    }
}
