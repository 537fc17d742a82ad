//! Client interceptor for outbound HTTP calls.
//!
//! Wrap any tower HTTP client (the hyper-util legacy client in the demo
//! binary) with [`ClientTraceLayer`]. Calls made while a request is being
//! handled carry its correlation id downstream.

use axum::http::{header::HOST, HeaderMap, HeaderValue, Request, Response, Uri};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::config::ClientConfig;
use crate::context;
use crate::dispatch::EventQueue;
use crate::trace::headers::{header_str, X_CLIENT_SEND, X_MUST_COLLECT, X_PARENT, X_REQUEST_ID, X_SPAN_ID};
use crate::trace::{Clock, SystemClock, TraceContext};

/// Outbound tracing settings.
#[derive(Debug, Clone, Default)]
pub struct ClientTraceConfig {
    /// `host:port` destinations that are never instrumented.
    pub untraced_hosts: HashSet<String>,
    /// Our own service key, propagated as `x-parent`.
    pub service_key: Option<u64>,
}

impl ClientTraceConfig {
    pub fn from_config(client: &ClientConfig, service_key: Option<u64>) -> Self {
        Self {
            untraced_hosts: client
                .untraced_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            service_key,
        }
    }

    pub fn is_untraced(&self, destination: &str) -> bool {
        self.untraced_hosts.contains(destination)
    }
}

/// Outbound call lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "call", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    Started(CallRecord),
    Finished(CallRecord),
}

impl ClientEvent {
    pub fn record(&self) -> &CallRecord {
        match self {
            ClientEvent::Started(r) | ClientEvent::Finished(r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    /// Correlation id; `None` when the call was made outside any request.
    pub id: Option<String>,
    /// `host:port` of the destination.
    pub host: String,
    pub url: String,
    /// µs since epoch.
    pub time: u64,
    pub headers: BTreeMap<String, String>,
}

/// Tower layer instrumenting outbound requests.
#[derive(Clone)]
pub struct ClientTraceLayer {
    config: Arc<ClientTraceConfig>,
    events: EventQueue<ClientEvent>,
    clock: Arc<dyn Clock>,
}

impl ClientTraceLayer {
    pub fn new(config: ClientTraceConfig, events: EventQueue<ClientEvent>) -> Self {
        Self {
            config: Arc::new(config),
            events,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<S> Layer<S> for ClientTraceLayer {
    type Service = ClientTraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientTraceService {
            inner,
            tracer: self.clone(),
        }
    }
}

/// The service produced by [`ClientTraceLayer`].
#[derive(Clone)]
pub struct ClientTraceService<S> {
    inner: S,
    tracer: ClientTraceLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ClientTraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        let destination = destination(req.uri(), req.headers());
        if destination
            .as_deref()
            .map_or(false, |d| self.tracer.config.is_untraced(d))
        {
            return Box::pin(inner.call(req));
        }
        let host = destination.unwrap_or_default();

        let ctx = req
            .extensions()
            .get::<Arc<TraceContext>>()
            .cloned()
            .or_else(context::current_trace);
        let id = ctx.as_ref().map(|c| c.transaction_id.clone());
        let url = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());

        let tracer = self.tracer.clone();
        let started = tracer.clock.now_micros();
        tracer.emit(ClientEvent::Started(CallRecord {
            id: id.clone(),
            host: host.clone(),
            url: url.clone(),
            time: started,
            headers: header_snapshot(req.headers()),
        }));

        if let Some(ctx) = &ctx {
            inject(req.headers_mut(), ctx, tracer.config.service_key, started);
        }

        tracing::debug!(
            destination = %host,
            url = %url,
            transaction_id = id.as_deref().unwrap_or_default(),
            "Outbound call"
        );

        let fut = inner.call(req);
        Box::pin(async move {
            let response = fut.await?;
            tracer.emit(ClientEvent::Finished(CallRecord {
                id,
                host,
                url,
                time: tracer.clock.now_micros(),
                headers: header_snapshot(response.headers()),
            }));
            Ok(response)
        })
    }
}

impl ClientTraceLayer {
    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.events.emit(event) {
            tracing::debug!(error = %e, "Client lifecycle event not delivered");
        }
    }
}

fn inject(headers: &mut HeaderMap, ctx: &TraceContext, service_key: Option<u64>, now: u64) {
    match HeaderValue::from_str(&ctx.transaction_id) {
        Ok(v) => {
            headers.insert(X_REQUEST_ID, v);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Transaction id is not a valid header value");
        }
    }
    if let Ok(v) = HeaderValue::from_str(&ctx.communication_id) {
        headers.insert(X_SPAN_ID, v);
    }
    headers.insert(X_CLIENT_SEND, HeaderValue::from(now));
    if let Some(key) = service_key {
        headers.insert(X_PARENT, HeaderValue::from(key));
    }
    if ctx.severity.is_must_collect() {
        headers.insert(X_MUST_COLLECT, HeaderValue::from_static("1"));
    }
}

/// `host:port` of an outbound request. The port defaults by scheme; relative
/// URIs fall back to the `Host` header.
pub fn destination(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    let default_port = match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    };

    if let Some(host) = uri.host() {
        let port = uri.port_u16().unwrap_or(default_port);
        return Some(format!("{}:{}", host.to_ascii_lowercase(), port));
    }

    let host = header_str(headers, &HOST)?.to_ascii_lowercase();
    if host.contains(':') {
        Some(host)
    } else {
        Some(format!("{host}:{default_port}"))
    }
}

fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
