//! Span records exchanged with the collector.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::trace::Severity;

/// Span-open input built from the inbound propagation headers.
///
/// Every field but `severity` is optional; `None` means "unknown", never zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuffelBag {
    pub severity: Severity,
    pub transaction_id: Option<String>,
    pub parent_service_key: Option<u64>,
    /// Caller's send time (µs since epoch).
    pub timestamp: Option<u64>,
    pub communication_id: Option<String>,
}

/// Outcome classification of a finished span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Bad,
}

impl SpanStatus {
    /// 4xx and 5xx are bad, everything else is ok.
    pub fn from_status_code(code: u16) -> Self {
        if code >= 400 {
            SpanStatus::Bad
        } else {
            SpanStatus::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanData {
    pub status_code: u16,
}

/// Descriptive fields of either half of a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanPayload {
    pub protocol: &'static str,
    pub host: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub status: Option<SpanStatus>,
    pub data: Option<SpanData>,
    /// Outcome-derived severity, only set on the SS half.
    pub severity: Option<Severity>,
}

impl SpanPayload {
    pub const HTTP: &'static str = "http";

    /// SR half of an HTTP span.
    pub fn http_recv(host: Option<String>, method: &str, resource: String) -> Self {
        Self {
            protocol: Self::HTTP,
            host,
            action: Some(method.to_string()),
            resource: Some(resource),
            status: None,
            data: None,
            severity: None,
        }
    }

    /// SS half of an HTTP span.
    pub fn http_send(status_code: u16, severity: Severity) -> Self {
        Self {
            protocol: Self::HTTP,
            host: None,
            action: None,
            resource: None,
            status: Some(SpanStatus::from_status_code(status_code)),
            data: Some(SpanData { status_code }),
            severity: Some(severity),
        }
    }
}

/// Correlation handle ("briefcase") linking SR and SS.
///
/// Produced by the collector when the SR span opens and never mutated
/// afterwards; shared as `Arc<TraceContext>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Identifier of this service's span.
    pub communication_id: String,
    /// End-to-end correlation id.
    pub transaction_id: String,
    pub severity: Severity,
    /// Caller's service key, if propagated.
    pub parent_service_key: Option<u64>,
    /// Caller's communication id, if propagated.
    pub parent_communication_id: Option<String>,
    /// SR time (µs since epoch).
    pub received_at: u64,
}

/// Options for closing the SS half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Close the span but suppress its reporting.
    pub skip: bool,
}

/// Result of a successful `server_send`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBag {
    pub severity: Severity,
    /// This service's key, echoed to the caller as `x-parent`.
    pub target_service_key: Option<u64>,
    /// SS time (µs since epoch), echoed as `x-server-send`.
    pub timestamp: Option<u64>,
}

/// Sample handed to the edge aggregator on every SR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMetricSample {
    pub service_key: Option<u64>,
    pub protocol: &'static str,
    /// `receive - client_send` in µs; `None` when the caller sent no timestamp.
    pub transport_delay: Option<i64>,
}

/// Microsecond wall clock.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_micros(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}
