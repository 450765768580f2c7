//! Trackwise - adaptive location tracking and reliable delivery
//!
//! The engine classifies motion from noisy sensor and position signals,
//! derives a location-sampling policy from motion and device conditions,
//! delivers location records over unreliable networks and tracks driving
//! sessions.
//!
//! # Modules
//!
//! - [`motion`]: motion classification with hysteresis
//! - [`policy`]: tracking profile selection
//! - [`sync`]: queued, shaped, retried delivery
//! - [`driving`]: driving sessions and events
//! - [`app`]: engine wiring and lifecycle
//! - [`ports`]: abstractions over platform collaborators

pub mod app;
pub mod config;
pub mod driving;
pub mod error;
pub mod geo;
pub mod logging;
pub mod motion;
pub mod policy;
pub mod ports;
pub mod sync;
pub mod telemetry;

pub use app::{EngineHandle, EngineReport, EngineSources, TrackingEngine};
pub use config::EngineConfig;
