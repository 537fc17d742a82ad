//! Server interceptor.
//!
//! # Responsibilities
//! - Consult the filter policy and pass ignored requests straight through
//! - Read propagation headers, open the SR half through the collector
//! - Report transport delay for the caller edge
//! - Run the wrapped service inside a fresh context scope holding the
//!   trace context
//! - Close the span exactly once via the completion guard and add the
//!   correlation response headers

use arc_swap::ArcSwap;
use axum::http::{header::HOST, Request, Response};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::context::{self, BRIEFCASE_KEY};
use crate::filter::FilterPolicy;
use crate::http::body::TracedBody;
use crate::http::completion::{AbortGuard, CompletionGuard};
use crate::observability::{EdgeMetrics, RpmMetrics};
use crate::trace::headers::header_str;
use crate::trace::{
    Clock, Collector, DuffelBag, EdgeMetricSample, InboundHints, SpanPayload, SystemClock,
};

/// Tower layer instrumenting inbound requests.
#[derive(Clone)]
pub struct ServerTraceLayer {
    collector: Arc<dyn Collector>,
    policy: Arc<ArcSwap<FilterPolicy>>,
    edges: Arc<EdgeMetrics>,
    rpm: Arc<RpmMetrics>,
    clock: Arc<dyn Clock>,
}

impl ServerTraceLayer {
    pub fn new(collector: Arc<dyn Collector>, policy: Arc<ArcSwap<FilterPolicy>>) -> Self {
        Self {
            collector,
            policy,
            edges: Arc::new(EdgeMetrics::new()),
            rpm: Arc::new(RpmMetrics::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_edge_metrics(mut self, edges: Arc<EdgeMetrics>) -> Self {
        self.edges = edges;
        self
    }

    pub fn with_rpm_metrics(mut self, rpm: Arc<RpmMetrics>) -> Self {
        self.rpm = rpm;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn edge_metrics(&self) -> &Arc<EdgeMetrics> {
        &self.edges
    }

    pub fn rpm_metrics(&self) -> &Arc<RpmMetrics> {
        &self.rpm
    }
}

impl<S> Layer<S> for ServerTraceLayer {
    type Service = ServerTraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ServerTraceService {
            inner,
            tracer: self.clone(),
        }
    }
}

/// The service produced by [`ServerTraceLayer`].
#[derive(Clone)]
pub struct ServerTraceService<S> {
    inner: S,
    tracer: ServerTraceLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ServerTraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response<TracedBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness.
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        let tracer = &self.tracer;
        let policy = tracer.policy.load_full();

        if policy.is_request_ignored(req.uri(), req.headers()) {
            tracing::trace!(path = %req.uri().path(), "Request ignored by filter policy");
            return passthrough(inner, req);
        }

        let sr_time = tracer.clock.now_micros();
        let hints = InboundHints::from_headers(req.headers());

        let bag = DuffelBag {
            severity: hints.severity,
            transaction_id: Some(
                hints
                    .transaction_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
            parent_service_key: hints.parent_service_key,
            timestamp: hints.client_send,
            communication_id: hints.communication_id.clone(),
        };

        let host = header_str(req.headers(), &HOST)
            .map(str::to_string)
            .or_else(|| req.uri().authority().map(|a| a.to_string()));
        let resource = policy.resource(req.uri());
        let payload = SpanPayload::http_recv(host, req.method().as_str(), resource);

        let sr_context = match tracer.collector.server_recv(&payload, &bag) {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open SR span, passing request through");
                return passthrough(inner, req);
            }
        };

        tracing::debug!(
            communication_id = %sr_context.communication_id,
            transaction_id = %sr_context.transaction_id,
            method = %req.method(),
            resource = payload.resource.as_deref().unwrap_or_default(),
            host = payload.host.as_deref().unwrap_or_default(),
            must_collect = hints.severity.is_must_collect(),
            "SR"
        );

        tracer.edges.report(EdgeMetricSample {
            service_key: hints.parent_service_key,
            protocol: SpanPayload::HTTP,
            transport_delay: hints.client_send.and_then(|sent| transport_delay(sr_time, sent)),
        });

        let guard = Arc::new(CompletionGuard::new(
            Arc::clone(&tracer.collector),
            policy,
            Arc::clone(&tracer.rpm),
            Arc::clone(&tracer.clock),
            Arc::clone(&sr_context),
            sr_time,
        ));

        // Explicit handle for code that leaves the carrier scope.
        req.extensions_mut().insert(Arc::clone(&sr_context));

        Box::pin(context::bind_scope(async move {
            let _abort = AbortGuard(Arc::clone(&guard));
            context::set(BRIEFCASE_KEY, sr_context);

            let response = inner.call(req).await?;
            let (mut parts, body) = response.into_parts();
            guard.write_head(parts.status, &mut parts.headers);
            Ok(Response::from_parts(parts, TracedBody::new(body, guard)))
        }))
    }
}

/// `received - sent` in µs. `None` when either timestamp does not fit the
/// signed range, so a bogus `x-client-send` counts as an unknown delay.
fn transport_delay(received: u64, sent: u64) -> Option<i64> {
    let received = i64::try_from(received).ok()?;
    let sent = i64::try_from(sent).ok()?;
    received.checked_sub(sent)
}

fn passthrough<S, ReqBody, ResBody>(
    mut inner: S,
    req: Request<ReqBody>,
) -> BoxFuture<'static, Result<Response<TracedBody<ResBody>>, S::Error>>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    let fut = inner.call(req);
    Box::pin(async move { fut.await.map(|res| res.map(TracedBody::passthrough)) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_delay_bounds() {
        assert_eq!(transport_delay(1_000_500, 1_000_000), Some(500));
        assert_eq!(transport_delay(1_000_000, 1_000_500), Some(-500));
        assert_eq!(transport_delay(1_000_000, 1 << 63), None);
        assert_eq!(transport_delay(u64::MAX, 0), None);
    }
}
