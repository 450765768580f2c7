//! Atomic delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::snapshot::SyncStats;

/// Counters shared between the sync pipeline and its observers.
///
/// All updates are `Relaxed`: counters are independent and only read for
/// reporting.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    items_enqueued: AtomicU64,
    items_delivered: AtomicU64,
    items_retried: AtomicU64,
    items_dropped: AtomicU64,
    records_sent: AtomicU64,
    records_thinned: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    batches_rejected: AtomicU64,
    bytes_sent: AtomicU64,
    latency_total_us: AtomicU64,
    last_latency_us: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_enqueued(&self) {
        self.items_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// A batch reached the sink.
    pub fn batch_sent(&self, items: usize, records: usize, bytes: usize, latency: Duration) {
        let latency_us = latency.as_micros().min(u64::MAX as u128) as u64;
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.items_delivered.fetch_add(items as u64, Ordering::Relaxed);
        self.records_sent.fetch_add(records as u64, Ordering::Relaxed);
        self.records_thinned
            .fetch_add(items.saturating_sub(records) as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.latency_total_us.fetch_add(latency_us, Ordering::Relaxed);
        self.last_latency_us.store(latency_us, Ordering::Relaxed);
    }

    /// A batch failed transiently.
    pub fn batch_failed(&self, retried: usize, dropped: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.items_retried.fetch_add(retried as u64, Ordering::Relaxed);
        self.items_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    /// A batch was refused permanently or could not be encoded.
    pub fn batch_rejected(&self, dropped: usize) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
        self.items_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn items_dropped(&self) -> u64 {
        self.items_dropped.load(Ordering::Relaxed)
    }

    pub fn items_delivered(&self) -> u64 {
        self.items_delivered.load(Ordering::Relaxed)
    }

    /// Counter snapshot; queue and link fields are left at their defaults.
    pub fn snapshot(&self) -> SyncStats {
        let batches_sent = self.batches_sent.load(Ordering::Relaxed);
        let latency_total_us = self.latency_total_us.load(Ordering::Relaxed);
        let average_latency = if batches_sent > 0 {
            Some(Duration::from_micros(latency_total_us / batches_sent))
        } else {
            None
        };
        let last_latency = if batches_sent > 0 {
            Some(Duration::from_micros(
                self.last_latency_us.load(Ordering::Relaxed),
            ))
        } else {
            None
        };

        SyncStats {
            items_enqueued: self.items_enqueued.load(Ordering::Relaxed),
            items_delivered: self.items_delivered.load(Ordering::Relaxed),
            items_retried: self.items_retried.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            records_thinned: self.records_thinned.load(Ordering::Relaxed),
            batches_sent,
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            average_latency,
            last_latency,
            ..SyncStats::default()
        }
    }
}
