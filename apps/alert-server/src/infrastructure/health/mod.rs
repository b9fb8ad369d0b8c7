//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, monitor status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks monitor progress)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{MonitorState, SharedDispatcher, TickReport};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::metrics::get_metrics_handle;

/// Ticks may lag this many periods before the server counts as not ready.
const READY_PERIODS: u32 = 3;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "starting", or "stalled".
    pub status: HealthStatus,
    /// Server version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connection and condition counts.
    pub subscriptions: SubscriptionStatus,
    /// Monitor loop progress.
    pub monitor: MonitorStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Monitor ticking on schedule.
    Healthy,
    /// No tick completed yet, still within the grace window.
    Starting,
    /// Monitor has fallen behind.
    Stalled,
}

/// Registry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Admitted connections.
    pub connections: usize,
    /// Registered conditions across all connections.
    pub conditions: usize,
    /// Attached outbound queues.
    pub outbound_queues: usize,
}

/// Monitor loop status.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    /// Configured tick period in milliseconds.
    pub interval_ms: u64,
    /// Completed ticks.
    pub ticks_completed: u64,
    /// Completion time of the last tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Summary of the last tick.
    pub last_report: Option<TickReport>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    interval: Duration,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: SharedDispatcher,
    monitor: Arc<MonitorState>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        interval: Duration,
        registry: Arc<SubscriptionRegistry>,
        dispatcher: SharedDispatcher,
        monitor: Arc<MonitorState>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            interval,
            registry,
            dispatcher,
            monitor,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state, Utc::now());
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Starting => StatusCode::OK,
        HealthStatus::Stalled => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state, Utc::now());

    if response.status == HealthStatus::Healthy {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState, now: DateTime<Utc>) -> HealthResponse {
    let stats = state.registry.stats();
    let last_tick_at = state.monitor.last_tick_at();
    let uptime = state.started_at.elapsed();

    HealthResponse {
        status: determine_health_status(state.interval, uptime, last_tick_at, now),
        version: state.version.clone(),
        uptime_secs: uptime.as_secs(),
        current_time: now,
        subscriptions: SubscriptionStatus {
            connections: stats.connection_count,
            conditions: stats.condition_count,
            outbound_queues: state.dispatcher.connection_count(),
        },
        monitor: MonitorStatus {
            interval_ms: u64::try_from(state.interval.as_millis()).unwrap_or(u64::MAX),
            ticks_completed: state.monitor.ticks_completed(),
            last_tick_at,
            last_report: state.monitor.last_report(),
        },
    }
}

fn determine_health_status(
    interval: Duration,
    uptime: Duration,
    last_tick_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> HealthStatus {
    let window = interval * READY_PERIODS;

    match last_tick_at {
        Some(at) => {
            let since = (now - at).to_std().unwrap_or(Duration::ZERO);
            if since <= window {
                HealthStatus::Healthy
            } else {
                HealthStatus::Stalled
            }
        }
        None if uptime <= window => HealthStatus::Starting,
        None => HealthStatus::Stalled,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
