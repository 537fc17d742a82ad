//! Bounded fire-and-forget event queue.
//!
//! Producers never wait: `emit` is a `try_send`, and an event that does not
//! fit is dropped and counted. A single worker task drains the queue into an
//! [`Exporter`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::DispatchError;
use crate::observability::metrics;

/// Destination for drained events.
pub trait Exporter<T>: Send + 'static {
    fn export(&mut self, event: T);
}

/// Forward into another channel. A closed receiver silently discards.
impl<T: Send + 'static> Exporter<T> for mpsc::UnboundedSender<T> {
    fn export(&mut self, event: T) {
        let _ = self.send(event);
    }
}

/// Producer handle. Cheap to clone.
#[derive(Debug)]
pub struct EventQueue<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T: Send + 'static> EventQueue<T> {
    /// Create a queue and spawn its worker on the current runtime.
    ///
    /// The worker exits once every producer handle has been dropped and the
    /// backlog is drained.
    pub fn spawn<E>(name: &'static str, capacity: usize, mut exporter: E) -> (Self, JoinHandle<()>)
    where
        E: Exporter<T>,
    {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                exporter.export(event);
            }
            tracing::debug!(queue = name, "Dispatch worker drained, exiting");
        });

        let queue = Self {
            name,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (queue, worker)
    }

    /// Enqueue without waiting.
    pub fn emit(&self, event: T) -> Result<(), DispatchError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_dispatch_dropped(self.name);
                Err(DispatchError::Full(self.name))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Closed(self.name)),
        }
    }

    /// Events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
