//! Collector boundary and the default queue-backed collector.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::dispatch::EventQueue;
use crate::error::{CollectorError, DispatchError};
use crate::trace::{Clock, DuffelBag, SendBag, SendOptions, Severity, SpanPayload, TraceContext};

/// Span-storage backend as seen by the interceptors.
///
/// Calls are made on the request path and must return quickly; anything slow
/// belongs behind an [`EventQueue`].
pub trait Collector: Send + Sync + 'static {
    /// Open the SR half of a span.
    fn server_recv(&self, payload: &SpanPayload, bag: &DuffelBag) -> Result<TraceContext, CollectorError>;

    /// Close the span with its SS half.
    fn server_send(
        &self,
        payload: &SpanPayload,
        ctx: &TraceContext,
        options: SendOptions,
    ) -> Result<SendBag, CollectorError>;

    /// Close the span without an observed status (finish/abort fallback).
    fn end(&self, ctx: &TraceContext);
}

/// What the default collector ships to its exporter.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpanRecord {
    Received {
        context: TraceContext,
        payload: SpanPayload,
    },
    Sent {
        communication_id: String,
        transaction_id: String,
        severity: Severity,
        payload: SpanPayload,
        timestamp: u64,
    },
    Ended {
        communication_id: String,
        transaction_id: String,
        timestamp: u64,
    },
}

/// Default collector: issues ids locally and hands span records to a
/// bounded queue.
#[derive(Debug, Clone)]
pub struct SpanCollector {
    service_key: Option<u64>,
    clock: Arc<dyn Clock>,
    records: EventQueue<SpanRecord>,
}

impl SpanCollector {
    pub fn new(service_key: Option<u64>, clock: Arc<dyn Clock>, records: EventQueue<SpanRecord>) -> Self {
        Self {
            service_key,
            clock,
            records,
        }
    }

    fn ship(&self, record: SpanRecord) -> Result<(), CollectorError> {
        match self.records.emit(record) {
            // A full queue loses the record but the span itself is fine.
            Ok(()) | Err(DispatchError::Full(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Collector for SpanCollector {
    fn server_recv(&self, payload: &SpanPayload, bag: &DuffelBag) -> Result<TraceContext, CollectorError> {
        let context = TraceContext {
            communication_id: Uuid::new_v4().to_string(),
            transaction_id: bag
                .transaction_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            severity: bag.severity,
            parent_service_key: bag.parent_service_key,
            parent_communication_id: bag.communication_id.clone(),
            received_at: self.clock.now_micros(),
        };

        self.ship(SpanRecord::Received {
            context: context.clone(),
            payload: payload.clone(),
        })?;
        Ok(context)
    }

    fn server_send(
        &self,
        payload: &SpanPayload,
        ctx: &TraceContext,
        options: SendOptions,
    ) -> Result<SendBag, CollectorError> {
        let severity = ctx.severity.merge(payload.severity.unwrap_or_default());
        let timestamp = self.clock.now_micros();

        if !options.skip {
            self.ship(SpanRecord::Sent {
                communication_id: ctx.communication_id.clone(),
                transaction_id: ctx.transaction_id.clone(),
                severity,
                payload: payload.clone(),
                timestamp,
            })?;
        }

        Ok(SendBag {
            severity,
            target_service_key: self.service_key,
            timestamp: Some(timestamp),
        })
    }

    fn end(&self, ctx: &TraceContext) {
        let record = SpanRecord::Ended {
            communication_id: ctx.communication_id.clone(),
            transaction_id: ctx.transaction_id.clone(),
            timestamp: self.clock.now_micros(),
        };
        if let Err(e) = self.ship(record) {
            tracing::warn!(communication_id = %ctx.communication_id, error = %e, "Failed to ship span end");
        }
    }
}
