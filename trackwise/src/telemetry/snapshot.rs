//! Point-in-time view of delivery state.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::policy::NetworkQuality;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    pub items_enqueued: u64,
    /// Queued items whose batch reached the sink (including thinned ones).
    pub items_delivered: u64,
    pub items_retried: u64,
    /// Items discarded after exhausting retries or by a permanent failure.
    pub items_dropped: u64,
    pub records_sent: u64,
    pub records_thinned: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub batches_rejected: u64,
    pub bytes_sent: u64,
    pub average_latency: Option<Duration>,
    pub last_latency: Option<Duration>,

    pub pending: usize,
    pub online: bool,
    pub quality: Option<NetworkQuality>,
    pub bandwidth_kbps: Option<f64>,
    pub cooldown_remaining: Option<Duration>,
}

impl SyncStats {
    /// Share of finished items that were delivered, in `[0, 1]`.
    pub fn delivery_ratio(&self) -> Option<f64> {
        let finished = self.items_delivered + self.items_dropped;
        if finished == 0 {
            None
        } else {
            Some(self.items_delivered as f64 / finished as f64)
        }
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Items:    {} enqueued, {} delivered, {} retried, {} dropped, {} pending",
            self.items_enqueued,
            self.items_delivered,
            self.items_retried,
            self.items_dropped,
            self.pending
        )?;
        writeln!(
            f,
            "Batches:  {} sent, {} failed, {} rejected ({} records, {} thinned, {} bytes)",
            self.batches_sent,
            self.batches_failed,
            self.batches_rejected,
            self.records_sent,
            self.records_thinned,
            self.bytes_sent
        )?;
        match self.average_latency {
            Some(latency) => writeln!(f, "Latency:  {:.1} ms average", latency.as_secs_f64() * 1000.0)?,
            None => writeln!(f, "Latency:  n/a")?,
        }
        write!(
            f,
            "Link:     {}",
            if self.online { "online" } else { "offline" }
        )?;
        if let Some(quality) = self.quality {
            write!(f, ", {}", quality)?;
        }
        if let Some(kbps) = self.bandwidth_kbps {
            write!(f, ", {:.0} kbit/s", kbps)?;
        }
        if let Some(cooldown) = self.cooldown_remaining {
            write!(f, ", cooling down {:.1}s", cooldown.as_secs_f64())?;
        }
        Ok(())
    }
}
