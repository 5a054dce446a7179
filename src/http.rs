//! HTTP surface for Prometheus metrics and health checks.
//!
//! Runs on a separate tokio task and serves `/metrics` for Prometheus
//! scraping and `/healthz` for liveness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;

/// Anything that can report whether the service is currently healthy.
///
/// Implemented by the Registry/Supervisor pairing: healthy means at least
/// one map has an established connection, or the Registry is running in
/// legacy mode (a single map that has not yet connected is not itself a
/// failure condition at startup).
pub trait HealthSource: Send + Sync {
    fn is_healthy(&self) -> bool;
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn healthz_handler(State(health): State<Arc<dyn HealthSource>>) -> StatusCode {
    if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Run the HTTP server for metrics and health checks.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background; it exits when `shutdown` fires.
pub async fn run_http_server(
    port: u16,
    health: Arc<dyn HealthSource>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(health);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "HTTP server listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind HTTP server");
            return;
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "HTTP server error");
    }
}
