//! Public HTTP Server
//!
//! Serves the alert WebSocket and the dashboard's read-only REST API on
//! one port.
//!
//! # Routes
//!
//! - `GET /`, `GET /ws` - WebSocket upgrade for the alert channel
//! - `GET /api/stock/{ticker}` - 30 days of mock price history
//! - `GET /api/news/{ticker}` - Headlines scraped from the news source
//! - `GET /api/analysis/{ticker}` - Model-generated market analysis
//!
//! The REST handlers never touch the subscription registry.

mod analysis;
mod news;
mod stock;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use news::NewsItem;
pub use stock::HistoryPoint;

use crate::infrastructure::config::UpstreamSettings;
use crate::infrastructure::websocket::{self, SharedHub};

// =============================================================================
// Dashboard Client
// =============================================================================

/// HTTP client for the dashboard's external collaborators.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    client: reqwest::Client,
    news_base_url: String,
    ollama_url: String,
    ollama_model: String,
}

impl DashboardClient {
    /// Create a client from upstream settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &UpstreamSettings) -> Result<Self, HttpServerError> {
        Self::with_timeout(settings, settings.timeout)
    }

    fn with_timeout(settings: &UpstreamSettings, timeout: Duration) -> Result<Self, HttpServerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stock-alert-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpServerError::ClientFailed(e.to_string()))?;

        Ok(Self {
            client,
            news_base_url: settings.news_source_url.trim_end_matches('/').to_string(),
            ollama_url: settings.ollama_url.trim_end_matches('/').to_string(),
            ollama_model: settings.ollama_model.clone(),
        })
    }
}

// =============================================================================
// Router
// =============================================================================

/// Shared state for the public router.
#[derive(Clone)]
pub struct AppState {
    /// WebSocket connection hub.
    pub hub: SharedHub,
    /// Dashboard upstream client.
    pub dashboard: Arc<DashboardClient>,
}

impl FromRef<AppState> for SharedHub {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.hub)
    }
}

impl FromRef<AppState> for Arc<DashboardClient> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.dashboard)
    }
}

/// Build the public router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(websocket::ws_handler))
        .route("/ws", get(websocket::ws_handler))
        .route("/api/stock/{ticker}", get(stock::stock_handler))
        .route("/api/news/{ticker}", get(news::news_handler))
        .route("/api/analysis/{ticker}", get(analysis::analysis_handler))
        .with_state(state)
}

fn error_response(message: &'static str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

// =============================================================================
// HTTP Server
// =============================================================================

/// Public HTTP + WebSocket server.
pub struct HttpServer {
    port: u16,
    state: AppState,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server stops with
    /// an error.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        serve(listener, self.state, self.cancel).await
    }
}

/// Serve the public router on an already bound listener until cancelled.
///
/// # Errors
///
/// Returns `HttpServerError` if the server stops with an error.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), HttpServerError> {
    let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();
    tracing::info!(port, "Alert server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

    tracing::info!("Alert server stopped");
    Ok(())
}

/// Public server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Failed to build the upstream HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientFailed(String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
