//! Span correlation subsystem (SR/SS protocol).
//!
//! # Data Flow
//! ```text
//! inbound headers
//!     → headers.rs (InboundHints: transaction id, parent, client-send, span id)
//!     → DuffelBag + SR SpanPayload
//!     → Collector::server_recv → TraceContext
//!
//! response head
//!     → SS SpanPayload (status, outcome severity)
//!     → Collector::server_send(skip?) → SendBag (x-parent, x-server-send)
//!
//! finish / abort without head
//!     → Collector::end
//! ```
//!
//! # Design Decisions
//! - Severity merges are escalate-only
//! - TraceContext is immutable once the collector hands it out
//! - The collector is a trait; the default one queues records, never blocks

pub mod collector;
pub mod headers;
pub mod severity;
pub mod types;

pub use collector::{Collector, SpanCollector, SpanRecord};
pub use headers::InboundHints;
pub use severity::Severity;
pub use types::{
    Clock, DuffelBag, EdgeMetricSample, SendBag, SendOptions, SpanData, SpanPayload, SpanStatus,
    SystemClock, TraceContext,
};
