//! edge-tracer demo host
//!
//! A small axum service instrumented with the tracer, useful for trying
//! propagation between two local instances.
//!
//! # Architecture Overview
//!
//! ```text
//!     Caller ──▶ TraceLayer ──▶ TimeoutLayer ──▶ ServerTraceLayer ──▶ handlers
//!                                                     │                  │
//!                                                     │ SR / SS          │ /relay
//!                                                     ▼                  ▼
//!                                               SpanCollector    ClientTraceLayer
//!                                                     │                  │
//!                                                     ▼                  ▼
//!                                              "spans" queue     "client_calls" queue
//!                                                     └──── LogExporter ─┘
//! ```
//!
//! Usage: `edge-tracer [config.toml]`. Without a path the defaults are used
//! and hot reload is disabled.

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use edge_tracer::config::{
    apply_filter_updates, load_config, validate_config, AgentConfig, ConfigWatcher,
};
use edge_tracer::context;
use edge_tracer::dispatch::{EventQueue, LogExporter};
use edge_tracer::filter::FilterPolicy;
use edge_tracer::http::{ClientTraceConfig, ClientTraceLayer, ClientTraceService, ServerTraceLayer};
use edge_tracer::observability::{logging, metrics};
use edge_tracer::trace::{SpanCollector, SystemClock, TraceContext};

type RelayClient = ClientTraceService<Client<HttpConnector, Body>>;
type RelayResponse = hyper::Response<Incoming>;

#[derive(Clone)]
struct AppState {
    relay: RelayClient,
    downstream: Option<Arc<str>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => {
            let config = AgentConfig::default();
            validate_config(&config).map_err(|errors| {
                errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
            })?;
            config
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        service = %config.service.name,
        service_key = ?config.service.service_key,
        bind_address = %config.listener.bind_address,
        "edge-tracer v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let capacity = config.dispatch.queue_capacity;
    let (spans, _span_worker) = EventQueue::spawn("spans", capacity, LogExporter::new("span"));
    let (calls, _call_worker) =
        EventQueue::spawn("client_calls", capacity, LogExporter::new("client_call"));

    let clock = Arc::new(SystemClock);
    let collector = Arc::new(SpanCollector::new(
        config.service.service_key,
        clock.clone(),
        spans,
    ));

    let policy = Arc::new(ArcSwap::from_pointee(FilterPolicy::from_config(&config.filter)?));

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            tokio::spawn(apply_filter_updates(updates, Arc::clone(&policy)));
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let http_client = Client::builder(TokioExecutor::new()).build_http::<Body>();
    let relay = ServiceBuilder::new()
        .layer(
            ClientTraceLayer::new(
                ClientTraceConfig::from_config(&config.client, config.service.service_key),
                calls,
            )
            .with_clock(clock.clone()),
        )
        .service(http_client);

    let state = AppState {
        relay,
        downstream: config.downstream.url.as_deref().map(Arc::from),
    };

    let app = build_router(&config, state, ServerTraceLayer::new(collector, policy).with_clock(clock));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[allow(deprecated)]
fn build_router(config: &AgentConfig, state: AppState, tracer: ServerTraceLayer) -> Router {
    Router::new()
        .route("/", any(echo_handler))
        .route("/health", get(health_handler))
        .route("/relay", any(relay_handler))
        .with_state(state)
        .layer(tracer)
        .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

async fn echo_handler(request: Request) -> impl IntoResponse {
    let trace = context::current_trace();
    Json(json!({
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "transaction_id": trace.as_ref().map(|t| t.transaction_id.clone()),
        "communication_id": trace.as_ref().map(|t| t.communication_id.clone()),
        "must_collect": trace.map(|t| t.severity.is_must_collect()).unwrap_or(false),
    }))
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Calls `downstream.url` through the traced client and relays the answer.
async fn relay_handler(State(state): State<AppState>, request: Request) -> Response {
    let Some(base) = state.downstream.as_deref() else {
        return (StatusCode::NOT_FOUND, "No downstream configured").into_response();
    };

    let uri: Uri = match format!("{}/", base.trim_end_matches('/')).parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(downstream = %base, error = %e, "Invalid downstream URL");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid downstream URL").into_response();
        }
    };

    let mut outbound = axum::http::Request::new(Body::empty());
    *outbound.method_mut() = request.method().clone();
    *outbound.uri_mut() = uri;
    if let Some(trace) = request.extensions().get::<Arc<TraceContext>>() {
        outbound.extensions_mut().insert(Arc::clone(trace));
    }

    match state.relay.oneshot(outbound).await {
        Ok(response) => relay_response(response),
        Err(e) => {
            tracing::error!(downstream = %base, error = %e, "Downstream call failed");
            (StatusCode::BAD_GATEWAY, "Downstream request failed").into_response()
        }
    }
}

fn relay_response(response: RelayResponse) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
