//! Logging setup and the Prometheus HTTP endpoint.

use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bind metrics port: {0}")]
    MetricsPort(#[from] std::io::Error),
}

/// Install the global tracing subscriber.
///
/// An explicit `log_level` directive wins over `RUST_LOG`.
pub fn init_logging(log_level: Option<&str>) -> Result<(), TelemetryError> {
    let env_filter = match log_level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,pulsar=debug")),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Prometheus HTTP Server
// ═══════════════════════════════════════════════════════════════════════════

/// Handle to a running metrics server. Aborts the server on drop.
pub struct MetricsServer {
    local_addr: SocketAddr,
    ready_flag: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl MetricsServer {
    /// Address the server actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Mark the process ready once its runners are up.
    pub fn set_ready(&self, ready: bool) {
        self.ready_flag.store(ready, Ordering::SeqCst);
    }
}

impl Drop for MetricsServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start the metrics HTTP server.
///
/// Exposes:
/// - `GET /metrics` - Prometheus metrics in text format
/// - `GET /health` - Liveness check
/// - `GET /ready` - 200 once [`MetricsServer::set_ready`] is called, 503 before
pub async fn start_metrics_server(addr: SocketAddr) -> Result<MetricsServer, TelemetryError> {
    let ready_flag = Arc::new(AtomicBool::new(false));
    let app = router(Arc::clone(&ready_flag));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "Starting metrics server");

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "Metrics server error");
        }
    });

    Ok(MetricsServer {
        local_addr,
        ready_flag,
        handle,
    })
}

fn router(ready_flag: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(Arc::clone(&ready_flag))))
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = ?e, "Failed to encode metrics");
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            axum::http::header::CONTENT_TYPE,
            encoder.format_type().to_string(),
        )],
        buffer,
    )
        .into_response()
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(HealthResponse { status: "ok" })
}

async fn ready_handler(ready_flag: Arc<AtomicBool>) -> impl IntoResponse {
    if ready_flag.load(Ordering::SeqCst) {
        (
            axum::http::StatusCode::OK,
            axum::Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(ReadyResponse {
                status: "not_ready",
                ready: false,
            }),
        )
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}
