//! Health Check Server - Metrics, Liveness and Readiness
//!
//! Exposes `/metrics`, `/live` and `/ready` via axum 0.7. Readiness
//! drops to 503 once the schedule stops or shutdown begins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::prometheus::MetricsRegistry;

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    /// Whether the schedule is still running.
    running: AtomicBool,
}

impl HealthState {
    /// Create a new health state (running by default).
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct AppState {
    health: Arc<HealthState>,
    metrics: Arc<MetricsRegistry>,
}

/// Axum-based metrics and health HTTP server.
pub struct HealthServer {
    health: Arc<HealthState>,
    metrics: Arc<MetricsRegistry>,
    bind_address: String,
}

impl HealthServer {
    pub fn new(
        health: Arc<HealthState>,
        metrics: Arc<MetricsRegistry>,
        bind_address: impl Into<String>,
    ) -> Self {
        Self {
            health,
            metrics,
            bind_address: bind_address.into(),
        }
    }

    /// Serve until `shutdown` is cancelled.
    #[instrument(skip(self, shutdown), fields(address = %self.bind_address))]
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/metrics", get(Self::metrics))
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(AppState {
                health: self.health,
                metrics: self.metrics,
            });

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!("Metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }

    async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
        match state.metrics.render() {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => {
                warn!(error = %e, "Failed to render metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, String::new())
            }
        }
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 while the schedule is running.
    async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
        if state.health.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}
