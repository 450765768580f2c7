//! Engine bootstrap and lifecycle management.
//!
//! [`TrackingEngine`] wires the four services together with an explicit
//! init → start → stop sequence.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── TrackingEngine ─────────────────────────────┐
//! │                                                                          │
//! │  EngineSources ──► router ──► MotionService ──► transitions ──┐          │
//! │                      │  ▲                                      │          │
//! │                      │  └──────────────────────────────────────┘          │
//! │                      ├──► PolicyService  ──► ProfileChange (broadcast)    │
//! │                      ├──► DrivingService ──► DrivingNotification ─► router│
//! │                      └──► SyncService    ──► SyncTransport                │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use trackwise::app::{EngineSources, TrackingEngine};
//!
//! let engine = TrackingEngine::new(&config, "driver-1", transport, store)?;
//! let handle = engine.start(EngineSources::new().with_positions(fix_rx));
//!
//! // Graceful shutdown
//! let report = handle.stop().await;
//! ```

mod bootstrap;
mod router;

pub use bootstrap::{EngineHandle, EngineReport, TrackingEngine};
pub use router::EngineSources;
