//! Ports for external collaborators.
//!
//! The four core components depend only on these abstractions, never on a
//! concrete platform binding. Push-style platform callbacks become
//! [`SignalSource`]s that deliver typed events in arrival order; outbound
//! effects go through [`SyncTransport`] and [`SessionStore`].
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so implementations can be shared as
//! `Arc<dyn SyncTransport>` and `Arc<dyn SessionStore>`.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::driving::DrivingSession;
use crate::error::{DeliveryError, StoreError};
use crate::sync::OutboundBatch;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stream of events from a platform collaborator.
///
/// Returns `None` once the source is closed; the consuming service then
/// stops listening to it.
pub trait SignalSource<T>: Send {
    fn next(&mut self) -> BoxFuture<'_, Option<T>>;
}

impl<T: Send + 'static> SignalSource<T> for mpsc::Receiver<T> {
    fn next(&mut self) -> BoxFuture<'_, Option<T>> {
        Box::pin(self.recv())
    }
}

impl<T: Send + 'static> SignalSource<T> for mpsc::UnboundedReceiver<T> {
    fn next(&mut self) -> BoxFuture<'_, Option<T>> {
        Box::pin(self.recv())
    }
}

impl<T, S> SignalSource<T> for Box<S>
where
    S: SignalSource<T> + ?Sized,
{
    fn next(&mut self) -> BoxFuture<'_, Option<T>> {
        (**self).next()
    }
}

/// Delivers a batch of location records to the remote sink.
pub trait SyncTransport: Send + Sync {
    fn send<'a>(&'a self, batch: &'a OutboundBatch) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// Persists a finalized driving session.
pub trait SessionStore: Send + Sync {
    fn save<'a>(&'a self, session: &'a DrivingSession) -> BoxFuture<'a, Result<(), StoreError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mpsc_receiver_is_a_signal_source() {
        let (tx, rx) = mpsc::channel::<u32>(4);
        let mut source: Box<dyn SignalSource<u32>> = Box::new(rx);

        tx.send(7).await.unwrap();
        drop(tx);

        assert_eq!(source.next().await, Some(7));
        assert_eq!(source.next().await, None);
    }
}
