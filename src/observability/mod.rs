//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! ServerTraceLayer
//!     → edge.rs (transport delay per caller edge, on SR)
//!     → metrics.rs RpmMetrics (response time + status, on SS)
//!     → metrics facade → Prometheus scrape endpoint
//!
//! Everything
//!     → logging.rs (tracing subscriber, structured fields)
//! ```
//!
//! # Design Decisions
//! - Metric updates are atomics / sharded map entries, cheap on the hot path
//! - In-process aggregates stay readable for tests without a recorder

pub mod edge;
pub mod logging;
pub mod metrics;

pub use edge::{EdgeKey, EdgeMetrics, EdgeStats};
pub use metrics::{RpmMetrics, RpmSnapshot};
