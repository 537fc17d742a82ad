//! Edge metrics aggregator.
//!
//! One entry per `(caller service key, protocol)` edge. A missing caller
//! timestamp is counted as an unknown delay and never folded into the delay
//! statistics as zero.

use dashmap::DashMap;

use crate::observability::metrics;
use crate::trace::EdgeMetricSample;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    /// `None` for untraced callers.
    pub service_key: Option<u64>,
    pub protocol: &'static str,
}

/// Accumulated samples for one edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeStats {
    pub samples: u64,
    pub unknown_delay: u64,
    pub delay_sum_us: i64,
    pub delay_min_us: Option<i64>,
    pub delay_max_us: Option<i64>,
}

impl EdgeStats {
    /// Samples that carried a delay.
    pub fn known_delay(&self) -> u64 {
        self.samples - self.unknown_delay
    }

    pub fn mean_delay_us(&self) -> Option<i64> {
        match self.known_delay() {
            0 => None,
            n => Some(self.delay_sum_us / n as i64),
        }
    }

    fn add(&mut self, delay: Option<i64>) {
        self.samples += 1;
        match delay {
            Some(d) => {
                self.delay_sum_us = self.delay_sum_us.saturating_add(d);
                self.delay_min_us = Some(self.delay_min_us.map_or(d, |m| m.min(d)));
                self.delay_max_us = Some(self.delay_max_us.map_or(d, |m| m.max(d)));
            }
            None => self.unknown_delay += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct EdgeMetrics {
    edges: DashMap<EdgeKey, EdgeStats>,
}

impl EdgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, sample: EdgeMetricSample) {
        let key = EdgeKey {
            service_key: sample.service_key,
            protocol: sample.protocol,
        };
        self.edges.entry(key).or_default().add(sample.transport_delay);
        metrics::record_edge_delay(sample.service_key, sample.protocol, sample.transport_delay);
    }

    pub fn get(&self, service_key: Option<u64>, protocol: &'static str) -> Option<EdgeStats> {
        self.edges
            .get(&EdgeKey { service_key, protocol })
            .map(|r| r.value().clone())
    }

    pub fn snapshot(&self) -> Vec<(EdgeKey, EdgeStats)> {
        self.edges
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}
