//! Prometheus counters for reconciliation, registry calls, rollouts, and
//! webhook deliveries, served over a small `axum` HTTP server.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref WORKLOADS_SUPERVISED: IntCounter = IntCounter::new(
        "watchcluster_workloads_supervised_total",
        "Workloads that entered the supervised set"
    )
    .unwrap();

    pub static ref RECONCILE_CHECKS_TOTAL: IntCounter = IntCounter::new(
        "watchcluster_reconcile_checks_total",
        "Scheduled checks run against supervised workloads"
    )
    .unwrap();

    pub static ref REGISTRY_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "watchcluster_registry_calls_total",
            "Registry gateway calls by outcome"
        ),
        &["outcome"]
    )
    .unwrap();

    pub static ref ROLLOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("watchcluster_rollouts_total", "Rollout driver outcomes"),
        &["outcome"]
    )
    .unwrap();

    pub static ref WEBHOOK_DELIVERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "watchcluster_webhook_deliveries_total",
            "Webhook delivery attempts by outcome"
        ),
        &["outcome"]
    )
    .unwrap();
}

pub fn register_metrics() {
    REGISTRY.register(Box::new(WORKLOADS_SUPERVISED.clone())).ok();
    REGISTRY.register(Box::new(RECONCILE_CHECKS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(REGISTRY_CALLS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(ROLLOUTS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(WEBHOOK_DELIVERIES_TOTAL.clone())).ok();
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics".to_string());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buffer).to_string())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Binds `addr` and serves `/metrics` and `/health` until the process exits.
pub async fn start_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    register_metrics();
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http());

    info!(%addr, "starting metrics server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
