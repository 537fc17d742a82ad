//! HTTP trace-context propagation and span correlation.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod http;
pub mod observability;
pub mod trace;

pub use config::schema::AgentConfig;
pub use http::{ClientTraceLayer, ServerTraceLayer};
pub use trace::{Collector, SpanCollector, TraceContext};
