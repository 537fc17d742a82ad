//! Context carrier subsystem.
//!
//! # Data Flow
//! ```text
//! ServerTraceLayer
//!     → carrier::bind_scope (fresh scope per inbound request)
//!     → carrier::set(BRIEFCASE_KEY, Arc<TraceContext>)
//!     → handler code, any number of .await points
//!     → ClientTraceLayer / completion hook: current_trace()
//! ```
//!
//! # Design Decisions
//! - Scopes ride on tokio task-locals; isolation comes from the runtime
//! - Crossing a `tokio::spawn` boundary is explicit (`carrier::spawn`)
//! - Lookups outside a scope return `None`, never panic

pub mod carrier;

pub use carrier::{bind_fn, bind_scope, current, get, set, spawn, Scope};

use std::sync::Arc;

use crate::trace::TraceContext;

/// Carrier key under which the active request's trace context lives.
pub const BRIEFCASE_KEY: &str = "tracer.briefcase";

/// Trace context of the request currently being handled, if any.
pub fn current_trace() -> Option<Arc<TraceContext>> {
    carrier::get(BRIEFCASE_KEY)
}
