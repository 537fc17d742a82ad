//! Configuration validation.
//!
//! Serde handles syntax; this checks semantics and returns every problem
//! found, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AgentConfig;
use crate::filter::FilterPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid ignore_paths pattern: {0}")]
    InvalidPattern(String),

    #[error("untraced host must be host:port, got '{0}'")]
    InvalidUntracedHost(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("listener.request_timeout_secs"));
    }
    if config.dispatch.queue_capacity == 0 {
        errors.push(ValidationError::Zero("dispatch.queue_capacity"));
    }

    if let Err(e) = FilterPolicy::from_config(&config.filter) {
        errors.push(ValidationError::InvalidPattern(e.to_string()));
    }

    for host in &config.client.untraced_hosts {
        let valid = host
            .rsplit_once(':')
            .map(|(h, p)| !h.is_empty() && p.parse::<u16>().is_ok())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidUntracedHost(host.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
