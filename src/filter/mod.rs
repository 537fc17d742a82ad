//! Filter subsystem.
//!
//! # Data Flow
//! ```text
//! FilterConfig (serde)
//!     → policy.rs (compile patterns)
//!     → Arc<ArcSwap<FilterPolicy>> held by ServerTraceLayer
//!     → swapped atomically on config reload
//! ```

pub mod policy;

pub use policy::FilterPolicy;
