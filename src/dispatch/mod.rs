//! Event dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! hot path (interceptors, collector)
//!     → queue.rs (bounded mpsc, try_send, drop newest when full)
//!     → worker task
//!     → Exporter (log line, channel, external backend)
//! ```
//!
//! # Design Decisions
//! - Emission never blocks or fails the request being served
//! - Backpressure policy is drop-newest; drops are counted and exported
//! - One worker per queue keeps per-queue ordering

pub mod queue;

pub use queue::{EventQueue, Exporter};

use serde::Serialize;

/// Writes each event as a single structured log line.
#[derive(Debug, Clone, Copy)]
pub struct LogExporter {
    kind: &'static str,
}

impl LogExporter {
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }
}

impl<T: Serialize + Send + 'static> Exporter<T> for LogExporter {
    fn export(&mut self, event: T) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "edge_tracer::export", kind = self.kind, event = %json),
            Err(e) => tracing::warn!(kind = self.kind, error = %e, "Failed to serialize event"),
        }
    }
}
