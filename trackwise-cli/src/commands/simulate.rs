//! Scenario replay through a complete tracking engine.
//!
//! A scenario is a JSON file of timed inputs:
//!
//! ```json
//! {
//!   "user": "driver-1",
//!   "start": "2026-01-05T08:00:00Z",
//!   "steps": [
//!     { "at": 0, "type": "connectivity", "kind": "wifi", "quality": "good" },
//!     { "at": 0, "type": "position", "latitude": 53.55, "longitude": 9.99, "speed": 12.0 },
//!     { "at": 1, "type": "motion", "acceleration": 1.4, "rotation": 0.2 },
//!     { "at": 5, "type": "power", "battery_percent": 18, "charging": false },
//!     { "at": 9, "type": "app", "state": "background" }
//!   ]
//! }
//! ```
//!
//! `at` is seconds after `start`. Deliveries go to an in-memory link whose
//! failure rate is set with `--fail-rate`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use trackwise::driving::{
    DrivingEvent, DrivingNotification, DrivingSession, JsonFileSessionStore, MemorySessionStore,
};
use trackwise::motion::{MotionInput, MotionSample, MotionState, MotionTransition, PositionSample};
use trackwise::policy::{AppState, PolicySignal, PowerReading, ProfileChange, TrackingProfile};
use trackwise::ports::SessionStore;
use trackwise::sync::{ConnectivityState, MemoryTransport};
use trackwise::{EngineConfig, EngineReport, EngineSources, TrackingEngine};

use super::config;
use crate::error::CliError;

/// Accuracy assumed for position steps that omit it (meters).
const DEFAULT_STEP_ACCURACY_M: f64 = 10.0;

/// Pause between steps when replaying as fast as possible.
const FAST_REPLAY_STEP: Duration = Duration::from_millis(1);

/// Output format for replay updates.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Arguments for `trackwise simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,

    /// Configuration file (defaults to the standard location)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Share of batches the simulated link fails, from 0.0 to 1.0
    #[arg(long, default_value_t = 0.0)]
    pub fail_rate: f64,

    /// Replay speed multiplier; omit to replay as fast as possible
    #[arg(long)]
    pub speed: Option<f64>,

    /// Store finished sessions as JSON files in this directory
    #[arg(long)]
    pub sessions_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// A replayable input script.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_start")]
    pub start: DateTime<Utc>,
    pub steps: Vec<Step>,
}

fn default_user() -> String {
    "simulator".to_string()
}

fn default_start() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Seconds after the scenario start.
    pub at: f64,
    #[serde(flatten)]
    pub input: StepInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepInput {
    Position {
        latitude: f64,
        longitude: f64,
        /// Omitted when the provider reports no speed.
        #[serde(default)]
        speed: Option<f64>,
        #[serde(default = "default_accuracy")]
        accuracy: f64,
    },
    Motion {
        acceleration: f64,
        rotation: f64,
    },
    SensorFault {
        reason: String,
    },
    Connectivity(ConnectivityState),
    Power(PowerReading),
    App {
        state: AppState,
    },
    BackgroundLimited {
        value: bool,
    },
    RealtimeRequested {
        value: bool,
    },
}

fn default_accuracy() -> f64 {
    DEFAULT_STEP_ACCURACY_M
}

impl Scenario {
    /// Read and validate a scenario file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let invalid = |reason: String| CliError::Scenario {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let scenario: Scenario =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        scenario.validate().map_err(invalid)?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), String> {
        let mut previous = 0.0;
        for (index, step) in self.steps.iter().enumerate() {
            if !step.at.is_finite() || step.at < 0.0 {
                return Err(format!("step {} has invalid offset {}", index, step.at));
            }
            if step.at < previous {
                return Err(format!(
                    "step {} at {}s comes before the previous step at {}s",
                    index, step.at, previous
                ));
            }
            previous = step.at;
        }
        Ok(())
    }

    fn timestamp(&self, step: &Step) -> DateTime<Utc> {
        self.start + chrono::Duration::milliseconds((step.at * 1000.0).round() as i64)
    }
}

/// Run `trackwise simulate`.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    if !(0.0..=1.0).contains(&args.fail_rate) {
        return Err(CliError::Config(format!(
            "--fail-rate must be between 0.0 and 1.0, got {}",
            args.fail_rate
        )));
    }
    if let Some(speed) = args.speed {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(CliError::Config(format!(
                "--speed must be positive, got {}",
                speed
            )));
        }
    }

    let scenario = Scenario::load(&args.scenario)?;
    let config = config::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(format!("failed to start async runtime: {}", e)))?;

    let report = runtime.block_on(replay(&scenario, &config, &args))?;
    print_report(&report, args.format)
}

/// Feed every step through a fresh engine and return its final report.
pub async fn replay(
    scenario: &Scenario,
    config: &EngineConfig,
    args: &SimulateArgs,
) -> Result<EngineReport, CliError> {
    let transport = Arc::new(MemoryTransport::with_fail_rate(args.fail_rate));
    let store: Arc<dyn SessionStore> = match &args.sessions_dir {
        Some(dir) => Arc::new(JsonFileSessionStore::new(dir.clone())),
        None => Arc::new(MemorySessionStore::new()),
    };

    let engine = TrackingEngine::new(config, scenario.user.clone(), transport, store)?;
    let updates = Updates {
        motion: engine.subscribe_motion(),
        profiles: engine.subscribe_profiles(),
        driving: engine.subscribe_driving(),
    };

    let (position_tx, position_rx) = mpsc::unbounded_channel();
    let (sensor_tx, sensor_rx) = mpsc::unbounded_channel();
    let (connectivity_tx, connectivity_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    let handle = engine.start(
        EngineSources::new()
            .with_positions(position_rx)
            .with_sensors(sensor_rx)
            .with_connectivity(connectivity_rx)
            .with_signals(signal_rx),
    );

    let cancellation = CancellationToken::new();
    let printer = tokio::spawn(print_updates(updates, args.format, cancellation.clone()));

    tracing::info!(
        steps = scenario.steps.len(),
        user = %scenario.user,
        "Replaying scenario"
    );

    let mut previous_at = 0.0;
    for step in &scenario.steps {
        let pause = match args.speed {
            Some(speed) => Duration::from_secs_f64((step.at - previous_at) / speed),
            None => FAST_REPLAY_STEP,
        };
        tokio::time::sleep(pause).await;
        previous_at = step.at;

        let at = scenario.timestamp(step);
        let delivered = match &step.input {
            StepInput::Position {
                latitude,
                longitude,
                speed,
                accuracy,
            } => position_tx
                .send(PositionSample::new(
                    *latitude,
                    *longitude,
                    speed.unwrap_or(-1.0),
                    *accuracy,
                    at,
                ))
                .is_ok(),
            StepInput::Motion {
                acceleration,
                rotation,
            } => sensor_tx
                .send(MotionInput::Motion(MotionSample::new(*acceleration, *rotation, at)))
                .is_ok(),
            StepInput::SensorFault { reason } => sensor_tx
                .send(MotionInput::SensorFault(reason.clone()))
                .is_ok(),
            StepInput::Connectivity(state) => connectivity_tx.send(*state).is_ok(),
            StepInput::Power(reading) => signal_tx.send(PolicySignal::Power(*reading)).is_ok(),
            StepInput::App { state } => signal_tx.send(PolicySignal::App(*state)).is_ok(),
            StepInput::BackgroundLimited { value } => signal_tx
                .send(PolicySignal::BackgroundLimited(*value))
                .is_ok(),
            StepInput::RealtimeRequested { value } => signal_tx
                .send(PolicySignal::RealtimeRequested(*value))
                .is_ok(),
        };

        if !delivered {
            return Err(CliError::Runtime(
                "engine stopped accepting input".to_string(),
            ));
        }
    }

    // Let the last inputs propagate before delivering what is queued
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.drain_sync().await;
    let report = handle.stop().await;

    cancellation.cancel();
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Update printer ended abnormally");
    }

    Ok(report)
}

struct Updates {
    motion: broadcast::Receiver<MotionTransition>,
    profiles: broadcast::Receiver<ProfileChange>,
    driving: broadcast::Receiver<DrivingNotification>,
}

/// One printable update.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Motion {
        from: MotionState,
        to: MotionState,
        at: DateTime<Utc>,
    },
    Profile {
        previous: &'a TrackingProfile,
        current: &'a TrackingProfile,
    },
    DrivingEvent {
        event: &'a DrivingEvent,
    },
    SessionStarted {
        session: &'a DrivingSession,
    },
    SessionFinished {
        session: &'a DrivingSession,
    },
    Report {
        report: &'a EngineReport,
    },
}

impl Line<'_> {
    fn render(&self, format: OutputFormat) -> Result<String, CliError> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string(self)?),
            OutputFormat::Text => Ok(self.to_text()),
        }
    }

    fn to_text(&self) -> String {
        match self {
            Line::Motion { from, to, at } => {
                format!("{}  motion   {} -> {}", at.to_rfc3339(), from.as_str(), to.as_str())
            }
            Line::Profile { previous, current } => format!(
                "profile  {} -> {} (min distance {} m, every {}s)",
                previous.tier.as_str(),
                current.tier.as_str(),
                current.min_distance_m,
                current.sampling_interval.as_secs_f64()
            ),
            Line::DrivingEvent { event } => {
                let mut text = format!(
                    "{}  driving  {}",
                    event.timestamp.to_rfc3339(),
                    event.kind.as_str()
                );
                if let Some(delta) = event.speed_delta() {
                    text.push_str(&format!(" (delta {:.1} m/s)", delta));
                }
                text
            }
            Line::SessionStarted { session } => format!(
                "{}  session  started {}",
                session.start_time.to_rfc3339(),
                session.id
            ),
            Line::SessionFinished { session } => format!(
                "{}  session  finished {} ({:.0} m, max {:.1} m/s, {} events)",
                session
                    .end_time
                    .unwrap_or(session.start_time)
                    .to_rfc3339(),
                session.id,
                session.distance_m,
                session.max_speed,
                session.event_count
            ),
            Line::Report { report } => {
                let sync = &report.sync;
                format!(
                    "Final motion state: {}\n\
                     Final profile:      {}\n\
                     Items delivered:    {} of {} ({} retried, {} dropped, {} pending)\n\
                     Batches sent:       {} ({} bytes, {} records thinned)\n\
                     Sessions stored:    {} ({} failed)",
                    report.motion_state.as_str(),
                    report.profile.tier.as_str(),
                    sync.items_delivered,
                    sync.items_enqueued,
                    sync.items_retried,
                    sync.items_dropped,
                    sync.pending,
                    sync.batches_sent,
                    sync.bytes_sent,
                    sync.records_thinned,
                    report.sessions.saved,
                    report.sessions.failed
                )
            }
        }
    }
}

fn driving_line(notification: &DrivingNotification) -> Line<'_> {
    match notification {
        DrivingNotification::Event(event) => Line::DrivingEvent { event },
        DrivingNotification::StateChanged {
            is_active: true,
            session,
        } => Line::SessionStarted { session },
        DrivingNotification::StateChanged { session, .. } => Line::SessionFinished { session },
    }
}

fn emit(line: &Line<'_>, format: OutputFormat) {
    match line.render(format) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::warn!(error = %e, "Failed to render update"),
    }
}

/// Print updates as they arrive; after cancellation, print what is left.
async fn print_updates(mut updates: Updates, format: OutputFormat, cancellation: CancellationToken) {
    loop {
        tokio::select! {
            biased;

            result = updates.motion.recv() => match result {
                Ok(t) => emit(&Line::Motion { from: t.from, to: t.to, at: t.at }, format),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Printer lagged behind motion updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            result = updates.profiles.recv() => match result {
                Ok(change) => emit(
                    &Line::Profile { previous: &change.previous, current: &change.current },
                    format,
                ),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Printer lagged behind profile updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            result = updates.driving.recv() => match result {
                Ok(notification) => emit(&driving_line(&notification), format),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Printer lagged behind driving updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = cancellation.cancelled() => break,
        }
    }

    while let Ok(t) = updates.motion.try_recv() {
        emit(&Line::Motion { from: t.from, to: t.to, at: t.at }, format);
    }
    while let Ok(change) = updates.profiles.try_recv() {
        emit(
            &Line::Profile {
                previous: &change.previous,
                current: &change.current,
            },
            format,
        );
    }
    while let Ok(notification) = updates.driving.try_recv() {
        emit(&driving_line(&notification), format);
    }
}

fn print_report(report: &EngineReport, format: OutputFormat) -> Result<(), CliError> {
    let line = Line::Report { report };
    if format == OutputFormat::Text {
        println!();
    }
    println!("{}", line.render(format)?);
    Ok(())
}
