//! Completion guard: closes a server span exactly once.
//!
//! # State Transitions
//! ```text
//! Opened → Completing: first of head written / body finished / closed
//! Completing → Closed: SS sent (head) or collector.end (finish, close)
//! ```
//! Later triggers are observed and ignored. A second head write is logged as
//! a warning since it means the reported status may be wrong.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context;
use crate::filter::FilterPolicy;
use crate::observability::RpmMetrics;
use crate::trace::headers::{X_MUST_COLLECT, X_PARENT, X_SERVER_SEND};
use crate::trace::{Clock, Collector, SendOptions, Severity, SpanPayload, SpanStatus, TraceContext};

/// Per-request completion state shared by the request future and the
/// response body.
pub struct CompletionGuard {
    collector: Arc<dyn Collector>,
    policy: Arc<FilterPolicy>,
    rpm: Arc<RpmMetrics>,
    clock: Arc<dyn Clock>,
    /// Context captured at SR; fallback when the carrier lost it.
    sr_context: Arc<TraceContext>,
    sr_time: u64,
    head_written: AtomicBool,
    completed: AtomicBool,
}

impl std::fmt::Debug for CompletionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGuard")
            .field("communication_id", &self.sr_context.communication_id)
            .field("head_written", &self.head_written.load(Ordering::Relaxed))
            .field("completed", &self.completed.load(Ordering::Relaxed))
            .finish()
    }
}

impl CompletionGuard {
    pub fn new(
        collector: Arc<dyn Collector>,
        policy: Arc<FilterPolicy>,
        rpm: Arc<RpmMetrics>,
        clock: Arc<dyn Clock>,
        sr_context: Arc<TraceContext>,
        sr_time: u64,
    ) -> Self {
        Self {
            collector,
            policy,
            rpm,
            clock,
            sr_context,
            sr_time,
            head_written: AtomicBool::new(false),
            completed: AtomicBool::new(false),
        }
    }

    /// Response head is about to be sent: close the span with SS and add the
    /// correlation headers to `headers`.
    ///
    /// Returns `true` if this call closed the span.
    pub fn write_head(&self, status: StatusCode, headers: &mut HeaderMap) -> bool {
        if self.head_written.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                communication_id = %self.sr_context.communication_id,
                "Response head written multiple times, wrongly reported status codes may occur"
            );
            return false;
        }
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let ss_time = self.clock.now_micros();
        let status_code = status.as_u16();

        let ctx = context::current_trace().unwrap_or_else(|| {
            tracing::warn!(
                communication_id = %self.sr_context.communication_id,
                "Lost trace context, falling back to SR context"
            );
            Arc::clone(&self.sr_context)
        });

        let outcome = match SpanStatus::from_status_code(status_code) {
            SpanStatus::Bad => Severity::MustCollect,
            SpanStatus::Ok => ctx.severity,
        };
        let skip = self.policy.is_status_ignored(status_code);
        let payload = SpanPayload::http_send(status_code, outcome);

        match self.collector.server_send(&payload, &ctx, SendOptions { skip }) {
            Ok(bag) => {
                let severity = bag.severity.merge(outcome);
                tracing::debug!(
                    communication_id = %ctx.communication_id,
                    status = status_code,
                    skip,
                    must_collect = severity.is_must_collect(),
                    "SS"
                );

                if let Some(key) = bag.target_service_key {
                    headers.insert(X_PARENT, HeaderValue::from(key));
                }
                if let Some(ts) = bag.timestamp {
                    headers.insert(X_SERVER_SEND, HeaderValue::from(ts));
                }
                if severity.is_must_collect() {
                    headers.insert(X_MUST_COLLECT, HeaderValue::from_static("1"));
                }
            }
            Err(e) => {
                tracing::warn!(
                    communication_id = %ctx.communication_id,
                    error = %e,
                    "Failed to create SS, cannot instrument headers"
                );
            }
        }

        self.rpm.record(status_code, ss_time.saturating_sub(self.sr_time));
        true
    }

    /// Response body fully sent.
    pub fn finish(&self) -> bool {
        self.end_without_head("finish")
    }

    /// Response or request aborted before completion.
    pub fn close(&self) -> bool {
        self.end_without_head("close")
    }

    pub fn is_closed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn end_without_head(&self, trigger: &'static str) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(
            communication_id = %self.sr_context.communication_id,
            trigger,
            "Span closed without response head"
        );
        self.collector.end(&self.sr_context);
        true
    }
}

/// Closes the span if dropped before the response head was produced.
pub(crate) struct AbortGuard(pub(crate) Arc<CompletionGuard>);

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use crate::trace::{DuffelBag, SendBag, SystemClock};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Calls {
        sends: Mutex<Vec<(SpanPayload, bool)>>,
        ends: Mutex<u32>,
        fail_send: bool,
    }

    impl Collector for Calls {
        fn server_recv(&self, _: &SpanPayload, _: &DuffelBag) -> Result<TraceContext, CollectorError> {
            unreachable!("guards are built after SR")
        }

        fn server_send(
            &self,
            payload: &SpanPayload,
            ctx: &TraceContext,
            options: SendOptions,
        ) -> Result<SendBag, CollectorError> {
            self.sends.lock().unwrap().push((payload.clone(), options.skip));
            if self.fail_send {
                return Err(CollectorError::Rejected("down".into()));
            }
            Ok(SendBag {
                severity: ctx.severity.merge(payload.severity.unwrap_or_default()),
                target_service_key: Some(9),
                timestamp: Some(123),
            })
        }

        fn end(&self, _: &TraceContext) {
            *self.ends.lock().unwrap() += 1;
        }
    }

    fn context(severity: Severity) -> Arc<TraceContext> {
        Arc::new(TraceContext {
            communication_id: "c1".into(),
            transaction_id: "t1".into(),
            severity,
            parent_service_key: None,
            parent_communication_id: None,
            received_at: 0,
        })
    }

    fn guard(collector: Arc<Calls>, severity: Severity, policy: FilterPolicy) -> CompletionGuard {
        CompletionGuard::new(
            collector,
            Arc::new(policy),
            Arc::new(RpmMetrics::new()),
            Arc::new(SystemClock),
            context(severity),
            0,
        )
    }

    #[test]
    fn test_head_then_finish_closes_once() {
        let calls = Arc::new(Calls::default());
        let guard = guard(Arc::clone(&calls), Severity::Default, FilterPolicy::default());
        let mut headers = HeaderMap::new();

        assert!(guard.write_head(StatusCode::OK, &mut headers));
        assert!(!guard.finish());
        assert!(!guard.close());

        assert_eq!(calls.sends.lock().unwrap().len(), 1);
        assert_eq!(*calls.ends.lock().unwrap(), 0);
        assert_eq!(headers.get(X_PARENT).unwrap(), "9");
        assert_eq!(headers.get(X_SERVER_SEND).unwrap(), "123");
        assert!(headers.get(X_MUST_COLLECT).is_none());
    }

    #[test]
    fn test_double_head_write_is_ignored() {
        let calls = Arc::new(Calls::default());
        let guard = guard(Arc::clone(&calls), Severity::Default, FilterPolicy::default());

        assert!(guard.write_head(StatusCode::OK, &mut HeaderMap::new()));
        assert!(!guard.write_head(StatusCode::INTERNAL_SERVER_ERROR, &mut HeaderMap::new()));
        assert_eq!(calls.sends.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_close_and_finish_end_once() {
        let calls = Arc::new(Calls::default());
        let guard = guard(Arc::clone(&calls), Severity::Default, FilterPolicy::default());

        assert!(guard.close());
        assert!(!guard.finish());
        assert!(!guard.write_head(StatusCode::OK, &mut HeaderMap::new()));
        assert_eq!(*calls.ends.lock().unwrap(), 1);
        assert!(calls.sends.lock().unwrap().is_empty());
        assert!(guard.is_closed());
    }

    #[test]
    fn test_error_status_escalates() {
        let calls = Arc::new(Calls::default());
        let guard = guard(Arc::clone(&calls), Severity::Default, FilterPolicy::default());
        let mut headers = HeaderMap::new();

        guard.write_head(StatusCode::SERVICE_UNAVAILABLE, &mut headers);
        assert_eq!(headers.get(X_MUST_COLLECT).unwrap(), "1");
        let sends = calls.sends.lock().unwrap();
        assert_eq!(sends[0].0.severity, Some(Severity::MustCollect));
        assert_eq!(sends[0].0.status, Some(SpanStatus::Bad));
    }

    #[test]
    fn test_success_keeps_must_collect() {
        let calls = Arc::new(Calls::default());
        let guard = guard(Arc::clone(&calls), Severity::MustCollect, FilterPolicy::default());
        let mut headers = HeaderMap::new();

        guard.write_head(StatusCode::OK, &mut headers);
        assert_eq!(headers.get(X_MUST_COLLECT).unwrap(), "1");
    }

    #[test]
    fn test_ignored_status_is_skipped() {
        let calls = Arc::new(Calls::default());
        let config = crate::config::FilterConfig {
            ignore_status_codes: vec![404],
            ..Default::default()
        };
        let policy = FilterPolicy::from_config(&config).unwrap();
        let guard = guard(Arc::clone(&calls), Severity::Default, policy);

        guard.write_head(StatusCode::NOT_FOUND, &mut HeaderMap::new());
        assert!(calls.sends.lock().unwrap()[0].1);
    }

    #[test]
    fn test_collector_failure_leaves_headers_alone() {
        let calls = Arc::new(Calls {
            fail_send: true,
            ..Default::default()
        });
        let guard = guard(Arc::clone(&calls), Severity::Default, FilterPolicy::default());
        let mut headers = HeaderMap::new();

        assert!(guard.write_head(StatusCode::BAD_GATEWAY, &mut headers));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_abort_guard_closes_on_drop() {
        let calls = Arc::new(Calls::default());
        let guard = Arc::new(guard(Arc::clone(&calls), Severity::Default, FilterPolicy::default()));

        drop(AbortGuard(Arc::clone(&guard)));
        assert!(guard.is_closed());
        assert_eq!(*calls.ends.lock().unwrap(), 1);
    }
}
