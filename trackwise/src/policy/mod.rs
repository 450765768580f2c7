//! Tracking policy.
//!
//! Derives a [`TrackingProfile`] from the confirmed motion state and the
//! device's battery, thermal, lifecycle, network and platform signals.
//!
//! ```text
//! PolicySignal ──► PolicyService ──► PolicyEngine::evaluate ──► ProfileTracker
//!                  (inputs + tick)    (pure)                     (dedupe) ──► ProfileChange
//! ```

mod engine;
mod profile;
mod service;
mod signals;

pub use engine::{
    DistanceMultipliers, PolicyConfig, PolicyEngine, PolicyInputs, ProfileTracker, TierTable,
    DEFAULT_APP_STATE, DEFAULT_BATTERY, DEFAULT_NETWORK, DEFAULT_THERMAL,
};
pub use profile::{
    AccuracyTier, CompositeStrategy, ProfileTier, SamplingMode, TierSettings, TrackingProfile,
};
pub use service::{PolicyHandle, PolicyService, PolicySignal, ProfileChange};
pub use signals::{
    AppState, BatteryLevel, NetworkCost, NetworkQuality, PowerReading, ThermalState,
};
