//! Ops Server
//!
//! Serves liveness, readiness and Prometheus metrics for the operator.

use crate::error::{Error, Result};
use crate::metrics::OperatorMetrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the ops server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpsServerConfig {
    /// Bind address for health and metrics endpoints
    pub addr: SocketAddr,
}

impl Default for OpsServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Shared state for ops handlers
#[derive(Clone)]
pub struct OpsState {
    pub metrics: Arc<OperatorMetrics>,
    pub ready: Arc<AtomicBool>,
}

/// Build the ops router
pub fn ops_router(state: OpsState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/livez", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<OpsState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "waiting for initial claim list")
    }
}

async fn metrics(State(state): State<OpsState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Encoding metrics failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// Ops Server
// =============================================================================

/// Health and metrics server
pub struct OpsServer {
    config: OpsServerConfig,
    state: OpsState,
}

impl OpsServer {
    /// Create a new ops server
    pub fn new(config: OpsServerConfig, state: OpsState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind ops server: {}", e)))?;

        info!("Ops server listening on {}", self.config.addr);

        axum::serve(listener, ops_router(self.state.clone()))
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Ops server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("Ops server error: {}", e)))?;

        Ok(())
    }
}
