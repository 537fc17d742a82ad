//! HTTP interception subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (filter check, SR, carrier scope)
//!     → application handler
//!         → client.rs (outbound calls pick up the carrier, inject headers)
//!     → completion.rs (head written: SS + response headers)
//!     → body.rs (body finished or dropped: fallback end)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Interception points are tower layers, composable with axum and hyper
//! - A request is closed exactly once, whichever trigger fires first
//! - Tracing failures are logged and never change the response

pub mod body;
pub mod client;
pub mod completion;
pub mod server;

pub use body::TracedBody;
pub use client::{CallRecord, ClientEvent, ClientTraceConfig, ClientTraceLayer, ClientTraceService};
pub use completion::CompletionGuard;
pub use server::{ServerTraceLayer, ServerTraceService};
