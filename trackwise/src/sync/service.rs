//! Background delivery loop around a [`SyncPipeline`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::connectivity::ConnectivityState;
use super::item::SyncItem;
use super::pipeline::{SyncConfig, SyncPipeline, SyncResult};
use crate::error::ConfigError;
use crate::ports::{SignalSource, SyncTransport};
use crate::telemetry::SyncStats;

/// Sync service (init stage).
pub struct SyncService {
    pipeline: SyncPipeline,
}

impl SyncService {
    pub fn new(config: SyncConfig, transport: Arc<dyn SyncTransport>) -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline: SyncPipeline::new(config, transport)?,
        })
    }

    pub fn pipeline(&self) -> &SyncPipeline {
        &self.pipeline
    }

    /// Spawn the delivery loop. Must be called inside a Tokio runtime.
    ///
    /// Items arriving on `items` are enqueued in arrival order; readings on
    /// `connectivity` update the gate, and a restored link flushes at once.
    pub fn start<I, C>(self, items: I, connectivity: C) -> SyncHandle
    where
        I: SignalSource<SyncItem> + 'static,
        C: SignalSource<ConnectivityState> + 'static,
    {
        let cancellation = CancellationToken::new();
        let pipeline = self.pipeline.clone();
        let task = tokio::spawn(run(self.pipeline, items, connectivity, cancellation.clone()));

        SyncHandle {
            pipeline,
            cancellation,
            task,
        }
    }
}

async fn run<I, C>(
    pipeline: SyncPipeline,
    mut items: I,
    mut connectivity: C,
    cancellation: CancellationToken,
) where
    I: SignalSource<SyncItem>,
    C: SignalSource<ConnectivityState>,
{
    let period = pipeline.config().flush_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut items_open = true;
    let mut connectivity_open = true;

    tracing::info!(flush_secs = period.as_secs(), "Sync service started");

    loop {
        let flush_due = tokio::select! {
            biased;

            _ = cancellation.cancelled() => break,

            item = items.next(), if items_open => {
                match item {
                    Some(item) => pipeline.enqueue(item),
                    None => items_open = false,
                }
                false
            }

            reading = connectivity.next(), if connectivity_open => {
                match reading {
                    Some(reading) => {
                        pipeline.on_connectivity_change(reading);
                    }
                    None => connectivity_open = false,
                }
                false
            }

            _ = pipeline.flush_requested() => true,

            _ = ticker.tick() => true,
        };

        if flush_due {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                _ = drain(&pipeline) => {}
            }
        }
    }

    // Items already handed over are queued, not lost
    while items_open {
        tokio::select! {
            biased;
            item = items.next() => match item {
                Some(item) => pipeline.enqueue(item),
                None => items_open = false,
            },
            _ = std::future::ready(()) => break,
        }
    }

    let stats = pipeline.stats();
    tracing::info!(
        delivered = stats.items_delivered,
        dropped = stats.items_dropped,
        pending = stats.pending,
        "Sync service stopped"
    );
}

/// Flush until the queue is empty or a flush does not send.
async fn drain(pipeline: &SyncPipeline) {
    let max_batch = pipeline.config().max_batch;
    loop {
        match pipeline.flush(max_batch).await {
            SyncResult::Sent { .. } if pipeline.pending() > 0 => continue,
            SyncResult::Skipped(reason) => {
                tracing::trace!(%reason, pending = pipeline.pending(), "Flush skipped");
                break;
            }
            _ => break,
        }
    }
}

/// Handle to a running [`SyncService`].
pub struct SyncHandle {
    pipeline: SyncPipeline,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn pipeline(&self) -> &SyncPipeline {
        &self.pipeline
    }

    pub fn stats(&self) -> SyncStats {
        self.pipeline.stats()
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// A delivery in progress is abandoned and its items stay queued.
    pub async fn stop(self) -> SyncStats {
        self.cancellation.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Sync task ended abnormally");
        }
        self.pipeline.stats()
    }
}
