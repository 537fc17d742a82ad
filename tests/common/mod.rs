//! Shared utilities for the interceptor integration tests.

#![allow(dead_code)]

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use edge_tracer::config::FilterConfig;
use edge_tracer::error::CollectorError;
use edge_tracer::filter::FilterPolicy;
use edge_tracer::http::ServerTraceLayer;
use edge_tracer::observability::{EdgeMetrics, RpmMetrics};
use edge_tracer::trace::{
    Clock, Collector, DuffelBag, SendBag, SendOptions, SpanPayload, TraceContext,
};

/// Service key the recording collector reports as its own.
pub const SERVICE_KEY: u64 = 7;

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn at(micros: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(micros)))
    }

    pub fn set(&self, micros: u64) {
        self.0.store(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collector that keeps every call for inspection.
#[derive(Debug)]
pub struct RecordingCollector {
    clock: Arc<ManualClock>,
    next_id: AtomicU64,
    pub fail_recv: bool,
    pub received: Mutex<Vec<(SpanPayload, DuffelBag)>>,
    pub sent: Mutex<Vec<(SpanPayload, SendOptions)>>,
    pub ended: Mutex<Vec<String>>,
}

impl RecordingCollector {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            fail_recv: false,
            received: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(clock: Arc<ManualClock>) -> Self {
        Self {
            fail_recv: true,
            ..Self::new(clock)
        }
    }

    pub fn recv_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn end_count(&self) -> usize {
        self.ended.lock().unwrap().len()
    }
}

impl Collector for RecordingCollector {
    fn server_recv(&self, payload: &SpanPayload, bag: &DuffelBag) -> Result<TraceContext, CollectorError> {
        if self.fail_recv {
            return Err(CollectorError::Rejected("collector offline".into()));
        }
        self.received.lock().unwrap().push((payload.clone(), bag.clone()));

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(TraceContext {
            communication_id: format!("span-{id}"),
            transaction_id: bag.transaction_id.clone().unwrap_or_default(),
            severity: bag.severity,
            parent_service_key: bag.parent_service_key,
            parent_communication_id: bag.communication_id.clone(),
            received_at: self.clock.now_micros(),
        })
    }

    fn server_send(
        &self,
        payload: &SpanPayload,
        ctx: &TraceContext,
        options: SendOptions,
    ) -> Result<SendBag, CollectorError> {
        self.sent.lock().unwrap().push((payload.clone(), options));
        Ok(SendBag {
            severity: ctx.severity.merge(payload.severity.unwrap_or_default()),
            target_service_key: Some(SERVICE_KEY),
            timestamp: Some(self.clock.now_micros()),
        })
    }

    fn end(&self, ctx: &TraceContext) {
        self.ended.lock().unwrap().push(ctx.communication_id.clone());
    }
}

/// A router wrapped in the server interceptor, plus handles on everything it
/// reports to.
pub struct Harness {
    pub app: Router,
    pub collector: Arc<RecordingCollector>,
    pub clock: Arc<ManualClock>,
    pub policy: Arc<ArcSwap<FilterPolicy>>,
    pub edges: Arc<EdgeMetrics>,
    pub rpm: Arc<RpmMetrics>,
}

impl Harness {
    pub fn new(routes: Router, filter: FilterConfig) -> Self {
        let clock = ManualClock::at(1_000_000);
        Self::with_collector(routes, filter, Arc::new(RecordingCollector::new(Arc::clone(&clock))), clock)
    }

    pub fn with_collector(
        routes: Router,
        filter: FilterConfig,
        collector: Arc<RecordingCollector>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let policy = Arc::new(ArcSwap::from_pointee(
            FilterPolicy::from_config(&filter).unwrap(),
        ));
        let edges = Arc::new(EdgeMetrics::new());
        let rpm = Arc::new(RpmMetrics::new());

        let layer = ServerTraceLayer::new(collector.clone(), Arc::clone(&policy))
            .with_clock(clock.clone())
            .with_edge_metrics(Arc::clone(&edges))
            .with_rpm_metrics(Arc::clone(&rpm));

        Self {
            app: routes.layer(layer),
            collector,
            clock,
            policy,
            edges,
            rpm,
        }
    }

    /// Send one request and read the full body.
    pub async fn send(&self, request: Request<Body>) -> (Response<()>, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        read(response).await
    }
}

pub async fn read(response: Response<Body>) -> (Response<()>, String) {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (
        Response::from_parts(parts, ()),
        String::from_utf8(bytes.to_vec()).unwrap(),
    )
}

pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}
