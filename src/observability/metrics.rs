//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_server_requests_total` (counter): traced responses by status code
//! - `http_server_response_time_us` (histogram): SR → SS latency
//! - `edge_transport_delay_us` (histogram): caller send → local receive
//! - `edge_unknown_delay_total` (counter): SRs without a caller timestamp
//! - `dispatch_dropped_total` (counter): events dropped by a full queue

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_response(status_code: u16, response_time_us: u64) {
    metrics::counter!("http_server_requests_total", "status" => status_code.to_string()).increment(1);
    metrics::histogram!("http_server_response_time_us").record(response_time_us as f64);
}

pub fn record_edge_delay(service_key: Option<u64>, protocol: &'static str, delay_us: Option<i64>) {
    let service = service_key.map(|k| k.to_string()).unwrap_or_else(|| "unknown".to_string());
    match delay_us {
        Some(delay) => {
            metrics::histogram!("edge_transport_delay_us", "service_key" => service, "protocol" => protocol)
                .record(delay as f64);
        }
        None => {
            metrics::counter!("edge_unknown_delay_total", "service_key" => service, "protocol" => protocol)
                .increment(1);
        }
    }
}

pub fn record_dispatch_dropped(queue: &'static str) {
    metrics::counter!("dispatch_dropped_total", "queue" => queue).increment(1);
}

/// In-process request counters (response times and status codes).
#[derive(Debug, Default)]
pub struct RpmMetrics {
    requests: AtomicU64,
    total_response_time_us: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time view of [`RpmMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RpmSnapshot {
    pub requests: u64,
    pub total_response_time_us: u64,
    /// Responses with status >= 400.
    pub errors: u64,
}

impl RpmMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response_time(&self, micros: u64) {
        self.total_response_time_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn add_status_code(&self, status_code: u16) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if status_code >= 400 {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one completed response here and in the metrics facade.
    pub fn record(&self, status_code: u16, response_time_us: u64) {
        self.add_response_time(response_time_us);
        self.add_status_code(status_code);
        record_response(status_code, response_time_us);
    }

    pub fn snapshot(&self) -> RpmSnapshot {
        RpmSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            total_response_time_us: self.total_response_time_us.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_counts() {
        let rpm = RpmMetrics::new();
        rpm.record(200, 150);
        rpm.record(503, 50);

        let snap = rpm.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.total_response_time_us, 200);
    }
}
