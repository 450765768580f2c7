//! Integration tests for the wired tracking engine.
//!
//! These tests verify the complete flow including:
//! - position fixes → motion classification → driving session lifecycle
//! - motion transitions and device signals → tracking profile changes
//! - every fix and driving boundary queued for delivery
//! - graceful stop
//!
//! Run with: `cargo test --test engine_integration`

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{broadcast, mpsc};

use trackwise::driving::{DrivingEventKind, DrivingNotification, MemorySessionStore, StartOutcome};
use trackwise::motion::{MotionState, PositionSample};
use trackwise::policy::{NetworkQuality, PolicySignal, PowerReading, ProfileChange, ProfileTier};
use trackwise::sync::{ConnectionKind, ConnectivityState, MemoryTransport};
use trackwise::{EngineConfig, EngineSources, TrackingEngine};

// ============================================================================
// Helper Functions
// ============================================================================

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// A fix heading north along a straight road.
fn fix(secs: i64, speed: f64) -> PositionSample {
    PositionSample::new(53.55 + secs as f64 * 0.0001, 9.99, speed, 5.0, t(secs))
}

/// A zero-speed fix at the spot where the car parked.
fn parked(secs: i64) -> PositionSample {
    PositionSample::new(53.55 + 41.0 * 0.0001, 9.99, 0.0, 5.0, t(secs))
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(value) = rx.try_recv() {
        out.push(value);
    }
    out
}

struct Harness {
    engine: TrackingEngine,
    transport: Arc<MemoryTransport>,
    store: Arc<MemorySessionStore>,
}

fn harness() -> Harness {
    let transport = Arc::new(MemoryTransport::new());
    let store = Arc::new(MemorySessionStore::new());
    let engine = TrackingEngine::new(
        &EngineConfig::default(),
        "driver-1",
        transport.clone(),
        store.clone(),
    )
    .unwrap();
    Harness {
        engine,
        transport,
        store,
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A drive followed by a long stop produces one stored session.
#[tokio::test(start_paused = true)]
async fn test_trip_lifecycle_end_to_end() {
    let Harness {
        engine,
        transport,
        store,
    } = harness();
    let mut driving = engine.subscribe_driving();
    let mut profiles = engine.subscribe_profiles();

    let (fix_tx, fix_rx) = mpsc::channel(16);
    let (conn_tx, conn_rx) = mpsc::channel(4);
    let handle = engine.start(
        EngineSources::new()
            .with_positions(fix_rx)
            .with_connectivity(conn_rx),
    );

    conn_tx
        .send(ConnectivityState::online(ConnectionKind::Wifi, NetworkQuality::Good))
        .await
        .unwrap();

    for s in 0..=40 {
        fix_tx.send(fix(s, 10.0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(handle.motion_state(), MotionState::Driving);
    assert!(handle.active_session().is_some());
    assert_eq!(handle.profile().tier, ProfileTier::HighPerformance);

    // Parked long enough to leave driving
    for s in 41..=190 {
        fix_tx.send(parked(s)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(handle.motion_state(), MotionState::Stationary);
    assert!(handle.active_session().is_none());

    let report = handle.stop().await;

    let notifications = drain(&mut driving);
    let lifecycle: Vec<bool> = notifications
        .iter()
        .filter_map(|n| match n {
            DrivingNotification::StateChanged { is_active, .. } => Some(*is_active),
            _ => None,
        })
        .collect();
    assert_eq!(lifecycle, vec![true, false]);

    let braking: Vec<_> = notifications
        .iter()
        .filter_map(|n| match n {
            DrivingNotification::Event(e) if e.kind == DrivingEventKind::HardBraking => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(braking.len(), 1);
    assert_eq!(braking[0].speed_delta(), Some(10.0));

    let tiers: Vec<ProfileTier> = drain(&mut profiles)
        .into_iter()
        .map(|c: ProfileChange| c.current.tier)
        .collect();
    assert_eq!(tiers, vec![ProfileTier::HighPerformance, ProfileTier::PowerSaver]);

    let sessions = store.sessions();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert!(!session.is_active);
    assert!(session.end_time.unwrap() >= session.start_time);
    assert!(session.distance_m > 0.0);
    assert_eq!(session.max_speed, 10.0);
    assert_eq!(report.sessions.saved, 1);

    assert_eq!(report.sync.items_dropped, 0);
    assert!(report.sync.items_delivered > 150);
    assert_eq!(transport.records().len() as u64, report.sync.records_sent);
}

#[tokio::test(start_paused = true)]
async fn test_critical_battery_forces_ultra_power_saver() {
    let Harness { engine, .. } = harness();
    let (signal_tx, signal_rx) = mpsc::channel(4);
    let handle = engine.start(EngineSources::new().with_signals(signal_rx));
    let mut profile = handle.watch_profile();

    signal_tx
        .send(PolicySignal::Power(PowerReading {
            battery_percent: Some(4.0),
            charging: false,
            thermal: None,
        }))
        .await
        .unwrap();
    profile.changed().await.unwrap();
    assert_eq!(profile.borrow().tier, ProfileTier::UltraPowerSaver);

    handle.stop().await;
}

#[tokio::test]
async fn test_manual_session_and_hard_braking() {
    let Harness { engine, store, .. } = harness();
    let mut driving = engine.subscribe_driving();
    let (fix_tx, fix_rx) = mpsc::channel(4);
    let handle = engine.start(EngineSources::new().with_positions(fix_rx));

    let Some(StartOutcome::Started(id)) = handle.start_session().await else {
        panic!("expected a new session");
    };
    assert_eq!(
        handle.start_session().await,
        Some(StartOutcome::AlreadyActive(id.clone()))
    );

    fix_tx.send(fix(0, 15.0)).await.unwrap();
    fix_tx.send(fix(1, 11.0)).await.unwrap();

    let event = loop {
        match driving.recv().await.unwrap() {
            DrivingNotification::Event(event) => break event,
            DrivingNotification::StateChanged { .. } => continue,
        }
    };
    assert_eq!(event.kind, DrivingEventKind::HardBraking);
    assert_eq!(event.speed_delta(), Some(4.0));
    assert_eq!(event.session_id, id);

    assert_eq!(handle.stop_session().await, Some(id));
    let report = handle.stop().await;
    assert_eq!(report.sessions.saved, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_further_mutation() {
    let Harness { engine, store, .. } = harness();
    let (fix_tx, fix_rx) = mpsc::channel(4);
    let handle = engine.start(EngineSources::new().with_positions(fix_rx));
    let motion = handle.watch_motion();
    let profile = handle.watch_profile();

    fix_tx.send(fix(0, 12.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.stop().await;

    assert!(fix_tx.send(fix(1, 12.0)).await.is_err());
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(*motion.borrow(), MotionState::Unknown);
    assert_eq!(profile.borrow().tier, ProfileTier::Balanced);
    assert!(store.is_empty());
}

/// A session closed out by stop still queues its end boundary.
#[tokio::test(start_paused = true)]
async fn test_stop_queues_end_of_running_session() {
    let Harness { engine, store, .. } = harness();
    let (fix_tx, fix_rx) = mpsc::channel(4);
    let handle = engine.start(EngineSources::new().with_positions(fix_rx));

    assert!(matches!(handle.start_session().await, Some(StartOutcome::Started(_))));
    fix_tx.send(fix(0, 12.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let report = handle.stop().await;
    assert_eq!(report.sessions.saved, 1);
    assert_eq!(store.sessions()[0].end_location, Some(fix(0, 12.0)));

    // The fix and its Critical end-boundary copy were both enqueued;
    // offline, the boundary replaced the queued fix
    assert_eq!(report.sync.items_enqueued, 2);
    assert_eq!(report.sync.pending, 1);
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let mut config = EngineConfig::default();
    config.sync.max_batch = 0;
    let result = TrackingEngine::new(
        &config,
        "driver-1",
        Arc::new(MemoryTransport::new()),
        Arc::new(MemorySessionStore::new()),
    );
    assert!(result.is_err());
}
