//! In-process transport.
//!
//! Keeps delivered batches in memory. Used for scenario replay and tests;
//! failures can be injected at a fixed rate.

use std::time::Duration;

use parking_lot::Mutex;

use super::item::LocationPayload;
use super::shaping::OutboundBatch;
use crate::error::DeliveryError;
use crate::ports::{BoxFuture, SyncTransport};

#[derive(Debug)]
enum FailureMode {
    Never,
    Always(DeliveryError),
    /// Fail a `rate` share of sends, spread evenly.
    Rate { rate: f64, accumulator: f64 },
}

#[derive(Debug)]
struct MemoryState {
    failure: FailureMode,
    attempts: usize,
    delivered: Vec<OutboundBatch>,
}

/// A [`SyncTransport`] that stores what it receives.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryTransport {
    /// Accepts every batch.
    pub fn new() -> Self {
        Self::with_failure(FailureMode::Never)
    }

    /// Refuses every batch with `error`.
    pub fn failing(error: DeliveryError) -> Self {
        Self::with_failure(FailureMode::Always(error))
    }

    /// Fails a `rate` share (clamped to `[0, 1]`) of sends transiently.
    ///
    /// Failures are spread deterministically: at 0.25 every fourth send fails.
    pub fn with_fail_rate(rate: f64) -> Self {
        let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
        Self::with_failure(FailureMode::Rate {
            rate,
            accumulator: 0.0,
        })
    }

    fn with_failure(failure: FailureMode) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                failure,
                attempts: 0,
                delivered: Vec::new(),
            }),
            latency: Duration::ZERO,
        }
    }

    /// Simulated time each send takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sends attempted, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Batches accepted.
    pub fn batches_received(&self) -> usize {
        self.state.lock().delivered.len()
    }

    pub fn batches(&self) -> Vec<OutboundBatch> {
        self.state.lock().delivered.clone()
    }

    /// Records of all accepted batches in delivery order.
    pub fn records(&self) -> Vec<LocationPayload> {
        self.state
            .lock()
            .delivered
            .iter()
            .flat_map(|batch| batch.records.iter().copied())
            .collect()
    }

    fn accept(&self, batch: &OutboundBatch) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        let outcome = match &mut state.failure {
            FailureMode::Never => Ok(()),
            FailureMode::Always(error) => Err(error.clone()),
            FailureMode::Rate { rate, accumulator } => {
                *accumulator += *rate;
                if *accumulator >= 1.0 {
                    *accumulator -= 1.0;
                    Err(DeliveryError::Transient("injected failure".into()))
                } else {
                    Ok(())
                }
            }
        };

        if outcome.is_ok() {
            state.delivered.push(batch.clone());
        }
        outcome
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTransport for MemoryTransport {
    fn send<'a>(&'a self, batch: &'a OutboundBatch) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.accept(batch)
        })
    }
}
