//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, pattern compilation)
//!     → AgentConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → apply_filter_updates swaps Arc<FilterPolicy>
//!     → new requests see the new filters
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only the filter policy is hot-reloadable; the rest needs a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AgentConfig, ClientConfig, DispatchConfig, DownstreamConfig, FilterConfig, ListenerConfig,
    ObservabilityConfig, ServiceConfig,
};
pub use loader::{load_config, ConfigError};
pub use validation::{validate_config, ValidationError};
pub use watcher::{apply_filter_updates, ConfigWatcher};
