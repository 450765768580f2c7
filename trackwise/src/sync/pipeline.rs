//! Queue, gate and deliver location records.
//!
//! # Flush Cycle
//!
//! ```text
//! flush(max)
//!   ├─ claim the in-flight slot            (busy → Skipped(InFlight))
//!   ├─ gate: connectivity, quality, cost,
//!   │        bandwidth, retry cooldown     (closed → Skipped(reason))
//!   ├─ pop ≤ max items in priority order   [lock held]
//!   ├─ shape a copy for the link quality
//!   ├─ transport.send(batch).await         [no lock held]
//!   └─ resolve                             [lock held]
//!        success   → count, reset cooldown
//!        transient → re-queue with retry+1, drop at max_retries, grow cooldown
//!        permanent → drop batch, grow cooldown
//! ```
//!
//! The queue mutex is never held across the transmit await, so
//! [`SyncPipeline::enqueue`] never waits for a flush in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::backoff::{RetryCooldown, DEFAULT_COOLDOWN_CEILING, DEFAULT_COOLDOWN_FLOOR};
use super::bandwidth::{BandwidthMonitor, DEFAULT_SMOOTHING};
use super::connectivity::ConnectivityState;
use super::item::SyncItem;
use super::queue::{QueuedItem, SyncQueue};
use super::shaping::{self, MAX_COMPRESSION_LEVEL};
use crate::config::check_duration;
use crate::error::{ConfigError, DeliveryError};
use crate::policy::{NetworkQuality, DEFAULT_NETWORK};
use crate::ports::SyncTransport;
use crate::telemetry::{SyncMetrics, SyncStats};

/// Default number of items per delivery.
pub const DEFAULT_MAX_BATCH: usize = 50;

/// Default number of retries before an item is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Configuration for the sync pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Upper bound on items per delivery.
    pub max_batch: usize,
    /// Retries per item after its first failed delivery.
    pub max_retries: u32,
    pub cooldown_floor: Duration,
    pub cooldown_ceiling: Duration,
    /// Shaping aggressiveness on degraded links (0-9).
    pub compression_level: u32,
    pub allow_poor_quality: bool,
    pub allow_metered: bool,
    /// Deliveries wait while the bandwidth estimate is below this. 0 disables.
    pub min_bandwidth_kbps: f64,
    /// Weight of the newest sample in the bandwidth estimate.
    pub bandwidth_smoothing: f64,
    /// Period of the service's background flush.
    pub flush_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch: DEFAULT_MAX_BATCH,
            max_retries: DEFAULT_MAX_RETRIES,
            cooldown_floor: DEFAULT_COOLDOWN_FLOOR,
            cooldown_ceiling: DEFAULT_COOLDOWN_CEILING,
            compression_level: 6,
            allow_poor_quality: true,
            allow_metered: true,
            min_bandwidth_kbps: 0.0,
            bandwidth_smoothing: DEFAULT_SMOOTHING,
            flush_interval: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch == 0 {
            return Err(ConfigError::invalid("sync.max_batch", "must be at least 1"));
        }
        check_duration("sync.cooldown_floor", self.cooldown_floor)?;
        check_duration("sync.cooldown_ceiling", self.cooldown_ceiling)?;
        if self.cooldown_ceiling < self.cooldown_floor {
            return Err(ConfigError::invalid(
                "sync.cooldown_ceiling",
                "must not be shorter than the cooldown floor",
            ));
        }
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(ConfigError::invalid(
                "sync.compression_level",
                format!("must be between 0 and {}", MAX_COMPRESSION_LEVEL),
            ));
        }
        if !(self.min_bandwidth_kbps.is_finite() && self.min_bandwidth_kbps >= 0.0) {
            return Err(ConfigError::invalid(
                "sync.min_bandwidth_kbps",
                "must be a non-negative number",
            ));
        }
        if !(self.bandwidth_smoothing > 0.0 && self.bandwidth_smoothing <= 1.0) {
            return Err(ConfigError::invalid(
                "sync.bandwidth_smoothing",
                "must be in (0, 1]",
            ));
        }
        check_duration("sync.flush_interval", self.flush_interval)
    }
}

/// Why a flush did not transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    PoorQuality,
    Metered,
    LowBandwidth,
    CoolingDown,
    /// Another flush is transmitting.
    InFlight,
    Empty,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Offline => "offline",
            SkipReason::PoorQuality => "poor quality",
            SkipReason::Metered => "metered",
            SkipReason::LowBandwidth => "low bandwidth",
            SkipReason::CoolingDown => "cooling down",
            SkipReason::InFlight => "in flight",
            SkipReason::Empty => "empty",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one [`SyncPipeline::flush`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncResult {
    Sent {
        items: usize,
        records: usize,
        bytes: usize,
        quality: NetworkQuality,
    },
    Skipped(SkipReason),
    /// Transient failure; surviving items were re-queued.
    Failed {
        retried: usize,
        dropped: usize,
        error: DeliveryError,
    },
    /// The batch was dropped as a whole.
    Rejected { dropped: usize, reason: String },
}

impl SyncResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, SyncResult::Sent { .. })
    }
}

struct PipelineState {
    queue: SyncQueue,
    connectivity: ConnectivityState,
    bandwidth: BandwidthMonitor,
    cooldown: RetryCooldown,
}

impl PipelineState {
    fn effective_quality(&self) -> NetworkQuality {
        self.connectivity
            .quality
            .or_else(|| self.bandwidth.quality())
            .unwrap_or(DEFAULT_NETWORK)
    }

    fn check_ready(&self, config: &SyncConfig, now: Instant) -> Result<(), SkipReason> {
        if !self.connectivity.is_online() {
            return Err(SkipReason::Offline);
        }
        if !config.allow_poor_quality && self.effective_quality() == NetworkQuality::Poor {
            return Err(SkipReason::PoorQuality);
        }
        if !config.allow_metered && self.connectivity.is_metered() {
            return Err(SkipReason::Metered);
        }
        if let Some(kbps) = self.bandwidth.estimate_kbps() {
            if kbps < config.min_bandwidth_kbps {
                return Err(SkipReason::LowBandwidth);
            }
        }
        if self.cooldown.is_active(now) {
            return Err(SkipReason::CoolingDown);
        }
        Ok(())
    }
}

struct Inner {
    config: SyncConfig,
    transport: Arc<dyn SyncTransport>,
    state: Mutex<PipelineState>,
    in_flight: AtomicBool,
    flush_requested: Notify,
    metrics: Arc<SyncMetrics>,
}

/// Holds the in-flight slot and the items taken for one flush.
///
/// Items still held when the guard drops (the flush future was cancelled
/// mid-transmit) go back to the queue unchanged.
struct FlushGuard<'a> {
    inner: &'a Inner,
    items: Vec<QueuedItem>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if !self.items.is_empty() {
            let mut state = self.inner.state.lock();
            for queued in self.items.drain(..) {
                state.queue.requeue(queued);
            }
        }
        self.inner.in_flight.store(false, Ordering::Release);
    }
}

/// Priority queue plus gated, shaped, retrying delivery.
///
/// Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct SyncPipeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("pending", &self.pending())
            .field("in_flight", &self.inner.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl SyncPipeline {
    pub fn new(config: SyncConfig, transport: Arc<dyn SyncTransport>) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = PipelineState {
            queue: SyncQueue::new(),
            connectivity: ConnectivityState::offline(),
            bandwidth: BandwidthMonitor::new(config.bandwidth_smoothing),
            cooldown: RetryCooldown::new(config.cooldown_floor, config.cooldown_ceiling),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state: Mutex::new(state),
                in_flight: AtomicBool::new(false),
                flush_requested: Notify::new(),
                metrics: Arc::new(SyncMetrics::new()),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn enqueue(&self, item: SyncItem) {
        let priority = item.priority;
        let (superseded, pending) = {
            let mut state = self.inner.state.lock();
            let superseded = state.queue.push(item);
            (superseded, state.queue.len())
        };
        self.inner.metrics.item_enqueued();
        tracing::trace!(%priority, pending, superseded, "Enqueued sync item");
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn can_sync_now(&self) -> bool {
        self.readiness().is_ok()
    }

    /// Like [`can_sync_now`](Self::can_sync_now), with the blocking reason.
    pub fn readiness(&self) -> Result<(), SkipReason> {
        let state = self.inner.state.lock();
        state.check_ready(&self.inner.config, Instant::now())
    }

    /// Record a connectivity reading.
    ///
    /// Returns `true` when the link came back online; the running service
    /// answers that with an immediate flush.
    pub fn on_connectivity_change(&self, connectivity: ConnectivityState) -> bool {
        let came_online = {
            let mut state = self.inner.state.lock();
            let previous = state.connectivity;
            let came_online = !previous.is_online() && connectivity.is_online();

            if connectivity.kind != previous.kind || connectivity.bandwidth_kbps.is_some() {
                state.bandwidth.reset(connectivity.bandwidth_kbps);
            }
            if came_online {
                state.cooldown.release();
            }
            state.connectivity = connectivity;
            came_online
        };

        tracing::debug!(
            kind = ?connectivity.kind,
            quality = ?connectivity.quality,
            metered = connectivity.is_metered(),
            "Connectivity changed"
        );
        if came_online {
            tracing::info!("Connectivity restored, requesting flush");
            self.inner.flush_requested.notify_one();
        }
        came_online
    }

    /// Resolves when a flush was requested out of band.
    pub async fn flush_requested(&self) {
        self.inner.flush_requested.notified().await;
    }

    pub fn stats(&self) -> SyncStats {
        let mut stats = self.inner.metrics.snapshot();
        let state = self.inner.state.lock();
        stats.pending = state.queue.len();
        stats.online = state.connectivity.is_online();
        stats.quality = state
            .connectivity
            .is_online()
            .then(|| state.effective_quality());
        stats.bandwidth_kbps = state.bandwidth.estimate_kbps();
        stats.cooldown_remaining = state.cooldown.remaining(Instant::now());
        stats
    }

    /// Attempt one delivery of up to `max_batch` items.
    pub async fn flush(&self, max_batch: usize) -> SyncResult {
        let inner = &*self.inner;
        if inner
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return SyncResult::Skipped(SkipReason::InFlight);
        }
        let mut guard = FlushGuard {
            inner,
            items: Vec::new(),
        };

        let quality = {
            let mut state = inner.state.lock();
            if let Err(reason) = state.check_ready(&inner.config, Instant::now()) {
                return SyncResult::Skipped(reason);
            }
            let limit = max_batch.clamp(1, inner.config.max_batch);
            guard.items = state.queue.pop_batch(limit);
            if guard.items.is_empty() {
                return SyncResult::Skipped(SkipReason::Empty);
            }
            state.effective_quality()
        };

        let items: Vec<SyncItem> = guard.items.iter().map(|q| q.item.clone()).collect();
        let batch = match shaping::shape(&items, quality, inner.config.compression_level) {
            Ok(batch) => batch,
            Err(e) => {
                let dropped = std::mem::take(&mut guard.items).len();
                tracing::error!(error = %e, dropped, "Failed to encode batch, dropping");
                inner.metrics.batch_rejected(dropped);
                return SyncResult::Rejected {
                    dropped,
                    reason: e.to_string(),
                };
            }
        };

        tracing::debug!(
            items = items.len(),
            records = batch.records.len(),
            bytes = batch.body.len(),
            %quality,
            "Sending batch"
        );
        let started = Instant::now();
        let outcome = inner.transport.send(&batch).await;
        let latency = started.elapsed();

        let taken = std::mem::take(&mut guard.items);
        match outcome {
            Ok(()) => {
                let bytes = batch.body.len();
                {
                    let mut state = inner.state.lock();
                    state.bandwidth.record(bytes, latency);
                    state.cooldown.record_success();
                }
                inner
                    .metrics
                    .batch_sent(taken.len(), batch.records.len(), bytes, latency);
                tracing::debug!(items = taken.len(), latency_ms = latency.as_millis() as u64, "Batch delivered");
                SyncResult::Sent {
                    items: taken.len(),
                    records: batch.records.len(),
                    bytes,
                    quality,
                }
            }
            Err(error) if error.is_permanent() => {
                let dropped = taken.len();
                let delay = inner.state.lock().cooldown.record_failure(Instant::now());
                inner.metrics.batch_rejected(dropped);
                tracing::warn!(%error, dropped, cooldown_secs = delay.as_secs(), "Batch rejected, dropping");
                SyncResult::Rejected {
                    dropped,
                    reason: error.to_string(),
                }
            }
            Err(error) => {
                let max_retries = inner.config.max_retries;
                let (retried, dropped, delay) = {
                    let mut state = inner.state.lock();
                    let mut retried = 0;
                    let mut dropped = 0;
                    for mut queued in taken {
                        if queued.item.retry_count >= max_retries {
                            dropped += 1;
                        } else {
                            queued.item.retry_count += 1;
                            retried += 1;
                            state.queue.requeue(queued);
                        }
                    }
                    let delay = state.cooldown.record_failure(Instant::now());
                    (retried, dropped, delay)
                };
                inner.metrics.batch_failed(retried, dropped);
                if dropped > 0 {
                    tracing::warn!(dropped, max_retries, "Retry budget exhausted, dropping items");
                }
                tracing::info!(%error, retried, cooldown_secs = delay.as_secs(), "Batch delivery failed");
                SyncResult::Failed {
                    retried,
                    dropped,
                    error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::NetworkCost;
    use crate::sync::{
        ConnectionKind, LocationPayload, MemoryTransport, OutboundBatch, SyncPriority,
    };
    use crate::ports::BoxFuture;
    use chrono::Utc;

    fn item(tag: f64, priority: SyncPriority) -> SyncItem {
        SyncItem::new(
            LocationPayload {
                latitude: tag,
                longitude: 10.0,
                speed: Some(1.0),
                accuracy: 5.0,
                timestamp: Utc::now(),
                motion: None,
            },
            priority,
        )
    }

    fn config() -> SyncConfig {
        SyncConfig {
            cooldown_floor: Duration::from_secs(1),
            cooldown_ceiling: Duration::from_secs(8),
            ..SyncConfig::default()
        }
    }

    fn online(pipeline: &SyncPipeline, quality: NetworkQuality) {
        pipeline.on_connectivity_change(ConnectivityState::online(ConnectionKind::Wifi, quality));
    }

    #[tokio::test]
    async fn test_offline_skips_and_keeps_items() {
        let transport = Arc::new(MemoryTransport::new());
        let pipeline = SyncPipeline::new(config(), transport.clone()).unwrap();
        pipeline.enqueue(item(1.0, SyncPriority::Normal));

        assert!(!pipeline.can_sync_now());
        assert_eq!(pipeline.flush(10).await, SyncResult::Skipped(SkipReason::Offline));
        assert_eq!(pipeline.pending(), 1);
        assert_eq!(transport.batches_received(), 0);
    }

    #[tokio::test]
    async fn test_sends_in_priority_order() {
        let transport = Arc::new(MemoryTransport::new());
        let pipeline = SyncPipeline::new(config(), transport.clone()).unwrap();
        online(&pipeline, NetworkQuality::Excellent);

        pipeline.enqueue(item(1.0, SyncPriority::Low));
        pipeline.enqueue(item(2.0, SyncPriority::Critical));
        pipeline.enqueue(item(3.0, SyncPriority::Normal));

        let result = pipeline.flush(10).await;
        assert!(result.is_sent());
        let delivered: Vec<f64> = transport.records().iter().map(|r| r.latitude).collect();
        assert_eq!(delivered, vec![2.0, 3.0, 1.0]);
        assert_eq!(pipeline.pending(), 0);
    }

    #[tokio::test]
    async fn test_gates() {
        let transport = Arc::new(MemoryTransport::new());
        let pipeline = SyncPipeline::new(
            SyncConfig {
                allow_poor_quality: false,
                allow_metered: false,
                min_bandwidth_kbps: 100.0,
                ..config()
            },
            transport,
        )
        .unwrap();

        online(&pipeline, NetworkQuality::Poor);
        assert_eq!(pipeline.readiness(), Err(SkipReason::PoorQuality));

        pipeline.on_connectivity_change(ConnectivityState::online(
            ConnectionKind::Cellular,
            NetworkQuality::Good,
        ));
        assert_eq!(pipeline.readiness(), Err(SkipReason::Metered));

        pipeline.on_connectivity_change(
            ConnectivityState::online(ConnectionKind::Wifi, NetworkQuality::Good)
                .with_cost(NetworkCost::Free)
                .with_bandwidth_kbps(50.0),
        );
        assert_eq!(pipeline.readiness(), Err(SkipReason::LowBandwidth));

        pipeline.on_connectivity_change(
            ConnectivityState::online(ConnectionKind::Wifi, NetworkQuality::Good)
                .with_bandwidth_kbps(5_000.0),
        );
        assert!(pipeline.can_sync_now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_requeues_and_cools_down() {
        let transport = Arc::new(MemoryTransport::failing(DeliveryError::Transient(
            "timeout".into(),
        )));
        let pipeline = SyncPipeline::new(config(), transport.clone()).unwrap();
        online(&pipeline, NetworkQuality::Good);
        pipeline.enqueue(item(1.0, SyncPriority::Normal));

        let result = pipeline.flush(10).await;
        assert!(matches!(result, SyncResult::Failed { retried: 1, dropped: 0, .. }));
        assert_eq!(pipeline.pending(), 1);
        assert_eq!(pipeline.readiness(), Err(SkipReason::CoolingDown));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(pipeline.can_sync_now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhaustion_drops_once() {
        let transport = Arc::new(MemoryTransport::failing(DeliveryError::Transient(
            "503".into(),
        )));
        let pipeline = SyncPipeline::new(config(), transport.clone()).unwrap();
        online(&pipeline, NetworkQuality::Good);
        pipeline.enqueue(item(1.0, SyncPriority::Normal));

        let mut attempts = 0;
        while pipeline.pending() > 0 {
            if pipeline.flush(10).await != SyncResult::Skipped(SkipReason::CoolingDown) {
                attempts += 1;
            }
            tokio::time::advance(Duration::from_secs(10)).await;
        }

        // One initial attempt plus three retries
        assert_eq!(attempts, 4);
        assert_eq!(transport.attempts(), 4);
        let stats = pipeline.stats();
        assert_eq!(stats.items_retried, 3);
        assert_eq!(stats.items_dropped, 1);
        assert_eq!(stats.items_delivered, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_batch() {
        let transport = Arc::new(MemoryTransport::failing(DeliveryError::Permanent(
            "400".into(),
        )));
        let pipeline = SyncPipeline::new(config(), transport).unwrap();
        online(&pipeline, NetworkQuality::Good);
        pipeline.enqueue(item(1.0, SyncPriority::Normal));
        pipeline.enqueue(item(2.0, SyncPriority::Normal));

        let result = pipeline.flush(10).await;
        assert!(matches!(result, SyncResult::Rejected { dropped: 2, .. }));
        assert_eq!(pipeline.pending(), 0);
        assert_eq!(pipeline.stats().items_dropped, 2);
    }

    #[tokio::test]
    async fn test_reconnect_requests_flush_and_releases_cooldown() {
        let transport = Arc::new(MemoryTransport::failing(DeliveryError::Transient(
            "reset".into(),
        )));
        let pipeline = SyncPipeline::new(config(), transport).unwrap();
        online(&pipeline, NetworkQuality::Good);
        pipeline.enqueue(item(1.0, SyncPriority::Normal));
        pipeline.flush(10).await;
        assert_eq!(pipeline.readiness(), Err(SkipReason::CoolingDown));

        assert!(!pipeline.on_connectivity_change(ConnectivityState::offline()));
        assert!(pipeline.on_connectivity_change(ConnectivityState::online(
            ConnectionKind::Wifi,
            NetworkQuality::Good
        )));
        assert!(pipeline.can_sync_now());

        // The stored permit resolves immediately
        tokio::time::timeout(Duration::from_secs(1), pipeline.flush_requested())
            .await
            .unwrap();
    }

    /// Holds every send until released.
    struct GatedTransport {
        release: Notify,
        inner: MemoryTransport,
    }

    impl SyncTransport for GatedTransport {
        fn send<'a>(&'a self, batch: &'a OutboundBatch) -> BoxFuture<'a, Result<(), DeliveryError>> {
            Box::pin(async move {
                self.release.notified().await;
                self.inner.send(batch).await
            })
        }
    }

    #[tokio::test]
    async fn test_single_flush_in_flight_and_enqueue_not_blocked() {
        let transport = Arc::new(GatedTransport {
            release: Notify::new(),
            inner: MemoryTransport::new(),
        });
        let pipeline = SyncPipeline::new(config(), transport.clone()).unwrap();
        online(&pipeline, NetworkQuality::Good);
        pipeline.enqueue(item(1.0, SyncPriority::Normal));

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.flush(10).await }
        });
        while !pipeline.inner.in_flight.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }

        // Queue stays usable while the first batch is on the wire
        pipeline.enqueue(item(2.0, SyncPriority::Normal));
        assert_eq!(pipeline.pending(), 1);
        assert_eq!(pipeline.flush(10).await, SyncResult::Skipped(SkipReason::InFlight));

        transport.release.notify_one();
        assert!(first.await.unwrap().is_sent());
        assert_eq!(transport.inner.batches_received(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_flush_returns_items() {
        let transport = Arc::new(GatedTransport {
            release: Notify::new(),
            inner: MemoryTransport::new(),
        });
        let pipeline = SyncPipeline::new(config(), transport).unwrap();
        online(&pipeline, NetworkQuality::Good);
        pipeline.enqueue(item(1.0, SyncPriority::Normal));

        let result = tokio::time::timeout(Duration::from_millis(10), pipeline.flush(10)).await;
        assert!(result.is_err());
        assert_eq!(pipeline.pending(), 1);
        assert!(!pipeline.inner.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let bad = SyncConfig {
            max_batch: 0,
            ..SyncConfig::default()
        };
        assert!(SyncPipeline::new(bad, transport.clone()).is_err());

        let bad = SyncConfig {
            compression_level: 12,
            ..SyncConfig::default()
        };
        assert!(SyncPipeline::new(bad, transport).is_err());
    }
}
