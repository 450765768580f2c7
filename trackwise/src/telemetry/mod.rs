//! Delivery telemetry.
//!
//! Lock-free counters updated by the sync pipeline, read as point-in-time
//! snapshots.
//!
//! ```text
//! SyncPipeline ─────► SyncMetrics ─────► SyncStats ─────► CLI, logs
//!                     (atomics)          (snapshot)
//! ```

mod metrics;
mod snapshot;

pub use metrics::SyncMetrics;
pub use snapshot::SyncStats;
