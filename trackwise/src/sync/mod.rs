//! Reliable delivery of location records.
//!
//! # Architecture
//!
//! ```text
//! SyncItem ──► SyncQueue ──► shaping ──► SyncTransport
//!              (priority,    (thin, round,   │
//!               FIFO)         gzip)          ▼
//!                 ▲                     success / transient / permanent
//!                 └──── retry+1 ◄────────────┘
//!
//! ConnectivityState ──► gate (online, quality, cost, bandwidth, cooldown)
//! ```

mod backoff;
mod bandwidth;
mod connectivity;
mod item;
mod memory;
mod pipeline;
mod queue;
mod service;
mod shaping;

pub use backoff::{RetryCooldown, DEFAULT_COOLDOWN_CEILING, DEFAULT_COOLDOWN_FLOOR};
pub use bandwidth::BandwidthMonitor;
pub use connectivity::{ConnectionKind, ConnectivityState};
pub use item::{LocationPayload, SyncItem, SyncPriority};
pub use memory::MemoryTransport;
pub use pipeline::{
    SkipReason, SyncConfig, SyncPipeline, SyncResult, DEFAULT_MAX_BATCH, DEFAULT_MAX_RETRIES,
};
pub use queue::{QueuedItem, SyncQueue};
pub use service::{SyncHandle, SyncService};
pub use shaping::{shape, BatchEncoding, OutboundBatch, ShapingPlan, MAX_COMPRESSION_LEVEL};
