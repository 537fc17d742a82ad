//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the tracer and its demo host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Listener configuration for the demo service.
    pub listener: ListenerConfig,

    /// Identity of this service in the trace graph.
    pub service: ServiceConfig,

    /// Inbound instrumentation exemptions.
    pub filter: FilterConfig,

    /// Outbound instrumentation settings.
    pub client: ClientConfig,

    /// Event queue settings.
    pub dispatch: DispatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Upstream used by the demo `/relay` route.
    pub downstream: DownstreamConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name used in logs.
    pub name: String,

    /// Numeric key reported to callers as `x-parent` and sent to callees.
    pub service_key: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "edge-tracer".to_string(),
            service_key: None,
        }
    }
}

/// Inbound filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Header name → values that exempt a request (`"*"` matches any value).
    pub ignore_headers: HashMap<String, Vec<String>>,

    /// Regex patterns matched against the request target, in order.
    pub ignore_paths: Vec<String>,

    /// Status codes whose SS half is closed but not reported.
    pub ignore_status_codes: Vec<u16>,

    /// Keep the query string in the span resource.
    pub keep_query_params: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_headers: HashMap::new(),
            ignore_paths: vec!["^/health$".to_string()],
            ignore_status_codes: Vec::new(),
            keep_query_params: false,
        }
    }
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` destinations that are never traced (e.g. the collector).
    pub untraced_hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of each event queue; overflow drops the newest event.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { queue_capacity: 4096 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Base URL, e.g. "http://127.0.0.1:8081".
    pub url: Option<String>,
}
