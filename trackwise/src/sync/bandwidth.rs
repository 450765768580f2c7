//! Bandwidth estimation from completed deliveries.
//!
//! Each successful transmit yields a throughput sample (bytes over latency).
//! Samples are blended into an exponentially weighted moving average so a
//! single slow or fast delivery does not swing the estimate.

use std::time::Duration;

use crate::policy::NetworkQuality;

/// Default weight of the newest sample.
pub const DEFAULT_SMOOTHING: f64 = 0.3;

/// Latencies below this are treated as this value when computing throughput.
const MIN_LATENCY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct BandwidthMonitor {
    smoothing: f64,
    estimate_kbps: Option<f64>,
    samples: u64,
}

impl BandwidthMonitor {
    /// `smoothing` is clamped to `(0, 1]`.
    pub fn new(smoothing: f64) -> Self {
        let smoothing = if smoothing.is_finite() {
            smoothing.clamp(f64::EPSILON, 1.0)
        } else {
            DEFAULT_SMOOTHING
        };
        Self {
            smoothing,
            estimate_kbps: None,
            samples: 0,
        }
    }

    /// Record a completed transfer; returns the sample's throughput in kbit/s.
    pub fn record(&mut self, bytes: usize, latency: Duration) -> f64 {
        let secs = latency.max(MIN_LATENCY).as_secs_f64();
        let kbps = (bytes as f64 * 8.0 / 1000.0) / secs;

        self.estimate_kbps = Some(match self.estimate_kbps {
            Some(previous) => previous + self.smoothing * (kbps - previous),
            None => kbps,
        });
        self.samples += 1;
        kbps
    }

    /// Replace the estimate after a link change.
    ///
    /// Measurements from the previous link are discarded; a platform hint, if
    /// present, becomes the starting estimate.
    pub fn reset(&mut self, hint_kbps: Option<f64>) {
        self.estimate_kbps = hint_kbps.filter(|k| k.is_finite() && *k >= 0.0);
        self.samples = 0;
    }

    pub fn estimate_kbps(&self) -> Option<f64> {
        self.estimate_kbps
    }

    /// Number of measured samples since the last reset.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn quality(&self) -> Option<NetworkQuality> {
        self.estimate_kbps.map(NetworkQuality::from_bandwidth_kbps)
    }
}

impl Default for BandwidthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}
