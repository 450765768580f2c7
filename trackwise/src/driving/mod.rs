//! Driving sessions and driving events.
//!
//! Follows the classifier's confirmed transitions into and out of
//! [`MotionState::Driving`](crate::motion::MotionState::Driving).
//!
//! ```text
//! MotionTransition ─┐
//! PositionSample  ──┼──► DrivingService ──► DrivingSessionTracker ──► DrivingNotification
//! MotionSample    ──┘                        (Idle ⇄ Active,           (events, start/stop)
//!                                             EventDetector)
//!                                                  │ finished
//!                                                  ▼
//!                                             SessionStore
//! ```

mod events;
mod service;
mod session;
mod store;
mod tracker;

pub use events::{DrivingEvent, DrivingEventKind, EventDetector, EventMetrics, EventThresholds};
pub use service::{
    DrivingHandle, DrivingInput, DrivingNotification, DrivingService, StoreStats,
};
pub use session::{DrivingSession, SessionId};
pub use store::{JsonFileSessionStore, MemorySessionStore};
pub use tracker::{DrivingConfig, DrivingSessionTracker, LifecycleChange, StartOutcome};
